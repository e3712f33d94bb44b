//! Environment-driven configuration.

/// Recognized environment variables:
///
/// - `CAPSTAN_VERBOSE` — widen per-dispatch logging (switchable later via
///   [`Context::set_verbose`](crate::Context::set_verbose)).
/// - `CAPSTAN_KEEP_ARTIFACTS` — retain the assembler's scratch directory
///   (input text and output binary) for debugging.
/// - `CAPSTAN_MAX_GROUP_SIZE` — ceiling on the resolved group size per
///   dimension; ignored unless a positive integer.
/// - `CAPSTAN_ASSEMBLER` — assembler executable name; resolved through the
///   process search path.
#[derive(Debug, Clone)]
pub struct Config {
    pub verbose: bool,
    pub keep_artifacts: bool,
    pub max_group_size: Option<u32>,
    pub assembler: String,
}

pub const DEFAULT_ASSEMBLER: &str = "hsailasm";

impl Default for Config {
    fn default() -> Self {
        Self {
            verbose: false,
            keep_artifacts: false,
            max_group_size: None,
            assembler: DEFAULT_ASSEMBLER.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let verbose = matches!(std::env::var("CAPSTAN_VERBOSE").as_deref(), Ok("1") | Ok("true"));
        let keep_artifacts = matches!(std::env::var("CAPSTAN_KEEP_ARTIFACTS").as_deref(), Ok("1") | Ok("true"));
        let max_group_size = std::env::var("CAPSTAN_MAX_GROUP_SIZE")
            .ok()
            .and_then(|raw| raw.parse::<u32>().ok())
            .filter(|&ceiling| ceiling > 0);
        let assembler =
            std::env::var("CAPSTAN_ASSEMBLER").unwrap_or_else(|_| DEFAULT_ASSEMBLER.to_string());
        Self { verbose, keep_artifacts, max_group_size, assembler }
    }
}
