//! Argument pre-processing
//!
//! Turns the raw argument vector into the settings the harness needs and
//! the selection tokens the selector consumes. Custom parameters are removed
//! from anywhere in the list first; the global flags are then peeled off the
//! tail, right to left, in a fixed probing order:
//!
//! 1. `randomize`
//! 2. a pure integer (element count)
//! 3. a device type (`gpu`, `cpu`, `accelerator`, `custom`, `CL_DEVICE_TYPE_*`)
//! 4. `id<N>` (device index)
//! 5. `pid<N>` (platform index)
//!
//! Each is stripped at most once and only from the current tail, so
//! `prog foo 1024 randomize` strips both, while `prog 1024 foo` strips
//! nothing and `1024` becomes a selection token.

//! **Status:** ✅ Complete - Custom params, list detection, tail stripping

use crate::api::DeviceType;
use crate::config::CompilationMode;
use crate::error::{Error, Result};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Element count used when none (or a non-positive one) is given.
pub const DEFAULT_NUM_ELEMENTS: usize = 0x4000;

// ---------------------------------------------------------------------------
// Custom parameters
// ---------------------------------------------------------------------------

/// Parameters shared by every suite, accepted anywhere on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomParams {
    pub compilation_mode: CompilationMode,
    pub compilation_cache_path: Option<PathBuf>,
    pub wimpy: bool,
}

/// Remove custom parameters from `tokens` and return what they set.
pub fn take_custom_params(tokens: &mut Vec<String>) -> Result<CustomParams> {
    let mut params = CustomParams::default();
    let mut kept = Vec::with_capacity(tokens.len());
    let mut iter = std::mem::take(tokens).into_iter();

    while let Some(token) = iter.next() {
        match token.as_str() {
            "--compilation-mode" => {
                let value = iter.next().ok_or_else(|| {
                    Error::config("Compilation mode not specified (online|binary|spir-v)")
                })?;
                params.compilation_mode = value.parse()?;
            }
            "--compilation-cache-path" => {
                let value = iter.next().ok_or_else(|| {
                    Error::config("Path argument for --compilation-cache-path was not specified.")
                })?;
                params.compilation_cache_path = Some(PathBuf::from(value));
            }
            "--wimpy" | "-w" => params.wimpy = true,
            _ => kept.push(token),
        }
    }

    *tokens = kept;
    Ok(params)
}

// ---------------------------------------------------------------------------
// Tail tokens
// ---------------------------------------------------------------------------

/// `strtol`-style integer that must consume the whole token.
fn parse_full_integer(token: &str) -> Option<i64> {
    let digits = token.strip_prefix(['+', '-']).unwrap_or(token);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let magnitude = digits
        .bytes()
        .fold(0i64, |acc, b| acc.saturating_mul(10).saturating_add(i64::from(b - b'0')));
    Some(if token.starts_with('-') { -magnitude } else { magnitude })
}

/// Device-type token accepted on the command line.
pub fn parse_device_type_arg(token: &str) -> Option<DeviceType> {
    match token {
        "gpu" | "CL_DEVICE_TYPE_GPU" => Some(DeviceType::Gpu),
        "cpu" | "CL_DEVICE_TYPE_CPU" => Some(DeviceType::Cpu),
        "accelerator" | "CL_DEVICE_TYPE_ACCELERATOR" => Some(DeviceType::Accelerator),
        "custom" | "CL_DEVICE_TYPE_CUSTOM" => Some(DeviceType::Custom),
        "CL_DEVICE_TYPE_DEFAULT" => Some(DeviceType::Default),
        _ => None,
    }
}

/// `<prefix><digits>`, e.g. `id2` or `pid0`.
fn parse_prefixed_index(token: &str, prefix: &str) -> Option<u32> {
    let digits = token.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn is_list_token(token: &str) -> bool {
    matches!(token, "-list" | "-h" | "--help")
}

// ---------------------------------------------------------------------------
// ParsedArgs
// ---------------------------------------------------------------------------

/// Result of pre-processing the argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedArgs {
    /// `argv[0]`
    pub program: String,
    /// `-list`, `-h` or `--help` was given
    pub list_requested: bool,
    /// Tokens left for the selector
    pub selection_tokens: Vec<String>,
    /// Element count passed to every test body
    pub num_elements: usize,
    /// Whether an element count token was given
    pub num_elements_overridden: bool,
    pub device_type: Option<DeviceType>,
    pub device_index: Option<u32>,
    pub platform_index: Option<u32>,
    /// `randomize` was given
    pub randomize: bool,
    /// Seed for the run RNG
    pub random_seed: u32,
    pub custom: CustomParams,
}

impl ParsedArgs {
    /// Shrunk argument count: program name plus selection tokens.
    pub fn remaining(&self) -> usize {
        1 + self.selection_tokens.len()
    }
}

/// Pre-process `argv` (program name first).
pub fn parse_args(argv: &[String]) -> Result<ParsedArgs> {
    let program = argv.first().cloned().unwrap_or_default();
    let mut tokens: Vec<String> = argv.iter().skip(1).cloned().collect();
    let custom = take_custom_params(&mut tokens)?;

    let mut parsed = ParsedArgs {
        program,
        list_requested: false,
        selection_tokens: Vec::new(),
        num_elements: DEFAULT_NUM_ELEMENTS,
        num_elements_overridden: false,
        device_type: None,
        device_index: None,
        platform_index: None,
        randomize: false,
        random_seed: 0,
        custom,
    };

    if tokens.first().is_some_and(|t| is_list_token(t)) {
        parsed.list_requested = true;
        return Ok(parsed);
    }

    if tokens.last().is_some_and(|t| t == "randomize") {
        tokens.pop();
        parsed.randomize = true;
        parsed.random_seed = wall_clock_seed();
    }

    if let Some(value) = tokens.last().and_then(|t| parse_full_integer(t)) {
        tokens.pop();
        parsed.num_elements_overridden = true;
        parsed.num_elements = if value <= 0 {
            DEFAULT_NUM_ELEMENTS
        } else {
            usize::try_from(value).unwrap_or(DEFAULT_NUM_ELEMENTS)
        };
    }

    if let Some(ty) = tokens.last().and_then(|t| parse_device_type_arg(t)) {
        tokens.pop();
        parsed.device_type = Some(ty);
    }

    if let Some(index) = tokens.last().and_then(|t| parse_prefixed_index(t, "id")) {
        tokens.pop();
        parsed.device_index = Some(index);
    }

    if let Some(index) = tokens.last().and_then(|t| parse_prefixed_index(t, "pid")) {
        tokens.pop();
        parsed.platform_index = Some(index);
    }

    parsed.selection_tokens = tokens;
    Ok(parsed)
}

fn wall_clock_seed() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}
