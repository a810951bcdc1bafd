//! Engine configuration (spec §6, `pl-feature.c`'s flag set): a builder over
//! the flags that shape compilation and execution, loadable from TOML.
//!
//! Grounded on the teacher's `CompilerConfig::new().with_builtin(...)`
//! builder pattern, generalized from "extra builtins" to the engine-wide
//! flag set `pl-feature.c` enumerates (`iso`, `optimise`, `debug`,
//! `unknown`, `double_quotes`, `occurs_check`, `gc`,
//! `last_call_optimisation`, `agc_margin`, `max_threads`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownAction {
    /// ISO default: calling an undefined procedure raises
    /// `existence_error(procedure, Name/Arity)`.
    Error,
    /// Calling an undefined procedure simply fails.
    Fail,
    /// Calling an undefined procedure emits a warning and fails.
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccursCheck {
    False,
    True,
    /// Occurs-check only where the compiler can prove it's needed.
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoubleQuotes {
    Codes,
    Chars,
    Atom,
    String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub iso: bool,
    pub optimise: bool,
    pub debug: bool,
    pub unknown: UnknownAction,
    pub double_quotes: DoubleQuotes,
    pub occurs_check: OccursCheck,
    pub gc_enabled: bool,
    pub last_call_optimisation: bool,
    /// Fraction of the atom table that may be garbage before an atom-GC
    /// cycle is triggered automatically (spec §4.7 "agc_margin").
    pub agc_margin: f32,
    pub max_threads: u32,
    /// Initial size, in words, for each of the four stacks; the shifter
    /// grows from here geometrically (spec §4.4).
    pub initial_stack_words: u32,
    /// Hard ceiling the shifter refuses to grow past (spec §4.4's
    /// "bounded growth" note); `0` means unbounded.
    pub max_stack_words: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            iso: true,
            optimise: false,
            debug: false,
            unknown: UnknownAction::Error,
            double_quotes: DoubleQuotes::Codes,
            occurs_check: OccursCheck::False,
            gc_enabled: true,
            last_call_optimisation: true,
            agc_margin: 0.25,
            max_threads: 64,
            initial_stack_words: 16 * 1024,
            max_stack_words: 0,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_iso(mut self, iso: bool) -> Self {
        self.iso = iso;
        self
    }

    pub fn with_optimise(mut self, optimise: bool) -> Self {
        self.optimise = optimise;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_unknown(mut self, unknown: UnknownAction) -> Self {
        self.unknown = unknown;
        self
    }

    pub fn with_occurs_check(mut self, occurs_check: OccursCheck) -> Self {
        self.occurs_check = occurs_check;
        self
    }

    pub fn with_gc_enabled(mut self, enabled: bool) -> Self {
        self.gc_enabled = enabled;
        self
    }

    pub fn with_last_call_optimisation(mut self, enabled: bool) -> Self {
        self.last_call_optimisation = enabled;
        self
    }

    pub fn with_max_threads(mut self, max: u32) -> Self {
        self.max_threads = max;
        self
    }

    pub fn with_stack_sizing(mut self, initial_words: u32, max_words: u32) -> Self {
        self.initial_stack_words = initial_words;
        self.max_stack_words = max_words;
        self
    }

    /// Resolve the compile-time flag `wam-compiler` needs (spec §4.1a).
    pub fn compiler_occurs_check(&self) -> bool {
        matches!(self.occurs_check, OccursCheck::True | OccursCheck::Auto)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn from_toml_file(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_iso_defaults() {
        let cfg = EngineConfig::new();
        assert!(cfg.iso);
        assert_eq!(cfg.unknown, UnknownAction::Error);
        assert!(!cfg.compiler_occurs_check());
    }

    #[test]
    fn builder_overrides_apply() {
        let cfg = EngineConfig::new()
            .with_unknown(UnknownAction::Fail)
            .with_occurs_check(OccursCheck::True)
            .with_max_threads(8);
        assert_eq!(cfg.unknown, UnknownAction::Fail);
        assert!(cfg.compiler_occurs_check());
        assert_eq!(cfg.max_threads, 8);
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = EngineConfig::new().with_max_threads(4);
        let text = toml::to_string(&cfg).unwrap();
        let parsed = EngineConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed.max_threads, 4);
    }
}
