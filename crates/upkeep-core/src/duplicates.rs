//! Duplicate binary detection
//!
//! Finds executable names provided by more than one manager on the search
//! path. Findings are advisory and never block a run.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::debug;
use upkeep_api::DuplicateConflict;
use upkeep_pkg::EnvSnapshot;

/// Where one manager's binaries live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateSource {
    pub manager: String,
    /// Install roots; a search path directory below any of them belongs to
    /// this manager
    pub roots: Vec<PathBuf>,
}

impl DuplicateSource {
    pub fn new(manager: impl Into<String>, roots: Vec<PathBuf>) -> Self {
        Self {
            manager: manager.into(),
            roots,
        }
    }

    /// Whether a search path directory lies under one of this source's roots
    #[must_use]
    pub fn owns(&self, dir: &Path) -> bool {
        self.specificity(dir).is_some()
    }

    /// Depth of the deepest root containing `dir`
    fn specificity(&self, dir: &Path) -> Option<usize> {
        self.roots
            .iter()
            .filter(|root| dir.starts_with(root))
            .map(|root| root.components().count())
            .max()
    }
}

/// The source with the most specific root containing `dir`
///
/// Ties go to the source listed first.
fn owner<'a>(dir: &Path, sources: &'a [DuplicateSource]) -> Option<&'a DuplicateSource> {
    let mut best: Option<(usize, &DuplicateSource)> = None;
    for source in sources {
        if let Some(depth) = source.specificity(dir)
            && best.is_none_or(|(current, _)| depth > current)
        {
            best = Some((depth, source));
        }
    }
    best.map(|(_, source)| source)
}

/// Default sources derived from the environment
#[must_use]
pub fn default_sources(env: &EnvSnapshot) -> Vec<DuplicateSource> {
    let home = env.home.clone();
    let under_home = |rel: &str| home.as_ref().map(|h| h.join(rel));
    let var_or = |var: &str, rel: &str| env.var(var).map(PathBuf::from).or_else(|| under_home(rel));

    let mut brew: Vec<PathBuf> = env.var("HOMEBREW_PREFIX").map(PathBuf::from).into_iter().collect();
    brew.extend(["/opt/homebrew", "/home/linuxbrew/.linuxbrew"].map(PathBuf::from));

    let sources = [
        DuplicateSource::new("brew", brew),
        DuplicateSource::new("asdf", var_or("ASDF_DATA_DIR", ".asdf").into_iter().collect()),
        DuplicateSource::new(
            "sdkman",
            env.sdkman_dir()
                .map(|dir| dir.join("candidates"))
                .into_iter()
                .collect(),
        ),
        DuplicateSource::new(
            "npm",
            var_or("NPM_CONFIG_PREFIX", ".npm-global").into_iter().collect(),
        ),
        DuplicateSource::new("pip", under_home(".local/bin").into_iter().collect()),
        DuplicateSource::new(
            "system",
            ["/usr/bin", "/bin", "/usr/sbin", "/sbin"].map(PathBuf::from).to_vec(),
        ),
    ];

    sources.into_iter().filter(|s| !s.roots.is_empty()).collect()
}

fn executables_in(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        debug!(dir = %dir.display(), "search path entry not readable");
        return Vec::new();
    };

    entries
        .filter_map(Result::ok)
        .filter(|entry| {
            entry
                .file_type()
                .is_ok_and(|t| t.is_file() || t.is_symlink())
        })
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect()
}

/// Binaries claimed by more than one manager, sorted by name
///
/// Each search path directory belongs to at most one source, the one with
/// the most specific root, so overlapping roots never turn a single
/// directory into a conflict. A binary seen twice under the same manager is
/// not a conflict either.
#[must_use]
pub fn detect(path_dirs: &[PathBuf], sources: &[DuplicateSource]) -> Vec<DuplicateConflict> {
    let mut claims: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut scanned = BTreeSet::new();

    for dir in path_dirs {
        if !scanned.insert(dir.clone()) {
            continue;
        }
        let Some(source) = owner(dir, sources) else {
            continue;
        };
        for binary in executables_in(dir) {
            claims
                .entry(binary)
                .or_default()
                .insert(source.manager.clone());
        }
    }

    claims
        .into_iter()
        .filter(|(_, managers)| managers.len() > 1)
        .map(|(binary, managers)| DuplicateConflict {
            binary,
            managers: managers.into_iter().collect(),
        })
        .collect()
}

/// Scan the snapshot's search path with the default sources
#[must_use]
pub fn detect_in(env: &EnvSnapshot) -> Vec<DuplicateConflict> {
    detect(&env.path_dirs(), &default_sources(env))
}

/// Human summary lines, truncated after `max` conflicts
#[must_use]
pub fn summarize(conflicts: &[DuplicateConflict], max: usize) -> Vec<String> {
    let mut lines: Vec<String> = conflicts.iter().take(max).map(DuplicateConflict::summary).collect();
    if conflicts.len() > max {
        lines.push(format!("... and {} more", conflicts.len() - max));
    }
    lines
}
