//! Shared test helpers for integration tests

use cts_harness::api::simulated::SimulatedApi;
use cts_harness::registry::{TestDefinition, TestEnv, TestOutcome, TestRegistry};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// Build an argv with a fixed program name.
pub fn argv(tokens: &[&str]) -> Vec<String> {
    std::iter::once("test_suite")
        .chain(tokens.iter().copied())
        .map(String::from)
        .collect()
}

/// An environment with nothing set.
#[allow(dead_code)]
pub fn no_env() -> HashMap<String, String> {
    HashMap::new()
}

/// An environment with the given variables set.
#[allow(dead_code)]
pub fn env(vars: &[(&str, &str)]) -> HashMap<String, String> {
    vars.iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Names of the tests whose bodies ran, in order.
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct RunLog(Rc<RefCell<Vec<String>>>);

#[allow(dead_code)]
impl RunLog {
    pub fn names(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// A test body that records its name and returns `outcome`.
    pub fn body(&self, name: &str, outcome: TestOutcome) -> TestDefinition<SimulatedApi> {
        let log = self.clone();
        let recorded = name.to_string();
        TestDefinition::new(name, move |_: &mut TestEnv<'_, SimulatedApi>| {
            log.0.borrow_mut().push(recorded.clone());
            outcome
        })
    }
}

/// `basic_a`, `basic_b`, `image_x` (all pass) plus unimplemented `other`.
#[allow(dead_code)]
pub fn basic_registry(log: &RunLog) -> TestRegistry<SimulatedApi> {
    let mut registry = TestRegistry::new("test_suite");
    registry.add(log.body("basic_a", TestOutcome::Pass)).unwrap();
    registry.add(log.body("basic_b", TestOutcome::Pass)).unwrap();
    registry.add(log.body("image_x", TestOutcome::Pass)).unwrap();
    registry.add(TestDefinition::unimplemented("other")).unwrap();
    registry
}

/// A registry with one test that remembers the element count it saw.
#[allow(dead_code)]
pub fn element_recorder() -> (TestRegistry<SimulatedApi>, Rc<Cell<usize>>) {
    let seen = Rc::new(Cell::new(0));
    let cell = seen.clone();
    let mut registry = TestRegistry::new("test_suite");
    registry
        .add(TestDefinition::new("elements", move |env: &mut TestEnv<'_, SimulatedApi>| {
            cell.set(env.num_elements);
            TestOutcome::Pass
        }))
        .unwrap();
    (registry, seen)
}
