//! Typed link policy, replacing command-line parsing (out of scope).
//!
//! Grounded on goblin's `options.rs`: a `Default`-able options struct
//! with builder-style `with_*` setters and a small enum for modes that
//! are mutually exclusive, plus the same `#[cfg(feature = "log")]`
//! warning-gate pattern.

use crate::container::Arch;

/// How a tentative (common) definition that collides with a dylib
/// export is handled (spec §4.3's Open Question, resolved in
/// DESIGN.md: defaults to the conservative `ConflictError`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommonsMode {
    /// `-commons use_dylibs`: the dylib export wins, the tentative
    /// definition is dropped.
    UseDylibs,
    /// `-commons override_dylibs`: the tentative definition wins.
    OverrideDylibs,
    /// No `-commons` flag: the collision is a hard error.
    ConflictError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndefinedTreatment {
    Error,
    /// Log a warning and downgrade the reference to a dynamic-lookup
    /// import, same as `DynamicLookup`, but noisily.
    Warning,
    /// Emit a dynamic-lookup stub instead of failing (`-undefined
    /// dynamic_lookup`), silently.
    DynamicLookup,
    /// Downgrade silently like `DynamicLookup`, but the synthesized
    /// import is left out of the output symbol table (`-undefined
    /// suppress`): the caller is asserting some other mechanism
    /// resolves it at runtime and doesn't want it advertised.
    Suppress,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOptions {
    pub arch: Arch,
    pub commons_mode: CommonsMode,
    pub undefined: UndefinedTreatment,
    /// `-dead_strip`: run `DeadStripper` after resolution.
    pub dead_strip: bool,
    /// `-u symbol`: additional dead-strip roots beyond the entry point.
    pub extra_roots: Vec<String>,
    /// `-why_live symbol`: print the live back-chain for this symbol.
    pub why_live: Option<String>,
    /// `-force_load`: pull in every member of every archive, rather
    /// than loading archive members on demand.
    pub force_load_archives: bool,
    /// `-ObjC`: pull in every archive member that defines an
    /// old-style (non-fragile) Objective-C class, even if nothing else
    /// references it yet (spec §2 item 4's "load-all-ObjC-classes").
    pub force_load_objc_classes: bool,
    /// Accept a weak/non-weak mismatch between two definitions of the
    /// same symbol instead of erroring (spec §4.3's override lattice).
    pub allow_weak_mismatch: bool,
    /// Produce a position-independent, slideable image; gates the
    /// absolute-addressing and read-only-pointer fixup checks (spec §7).
    pub pie: bool,
    pub tolerate_truncated_stab_names: bool,
}

impl LinkOptions {
    pub fn new(arch: Arch) -> Self {
        LinkOptions {
            arch,
            commons_mode: CommonsMode::ConflictError,
            undefined: UndefinedTreatment::Error,
            dead_strip: false,
            extra_roots: Vec::new(),
            why_live: None,
            force_load_archives: false,
            force_load_objc_classes: false,
            allow_weak_mismatch: false,
            pie: true,
            tolerate_truncated_stab_names: false,
        }
    }

    pub fn with_commons_mode(mut self, mode: CommonsMode) -> Self {
        self.commons_mode = mode;
        self
    }

    pub fn with_undefined(mut self, treatment: UndefinedTreatment) -> Self {
        self.undefined = treatment;
        self
    }

    pub fn with_dead_strip(mut self, dead_strip: bool) -> Self {
        self.dead_strip = dead_strip;
        self
    }

    pub fn with_extra_root(mut self, symbol: impl Into<String>) -> Self {
        self.extra_roots.push(symbol.into());
        self
    }

    pub fn with_why_live(mut self, symbol: impl Into<String>) -> Self {
        self.why_live = Some(symbol.into());
        self
    }

    pub fn with_force_load_archives(mut self, force: bool) -> Self {
        self.force_load_archives = force;
        self
    }

    pub fn with_force_load_objc_classes(mut self, force: bool) -> Self {
        self.force_load_objc_classes = force;
        self
    }

    pub fn with_pie(mut self, pie: bool) -> Self {
        self.pie = pie;
        self
    }
}

/// Emits `msg` through the `log` crate at `warn` level when the `log`
/// feature is enabled; a silent no-op otherwise. Matches goblin's
/// `options.rs` warning gate exactly.
#[cfg(feature = "log")]
pub fn warn(msg: &str) {
    log::warn!("{}", msg);
}

#[cfg(not(feature = "log"))]
pub fn warn(_msg: &str) {}
