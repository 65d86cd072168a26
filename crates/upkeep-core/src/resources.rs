//! Pre-flight resource checks
//!
//! Disk space, repository reachability and available memory, checked once
//! per run before any manager is touched. Disk and reachability are the
//! engine's only hard gate; see [`ResourceReport::passed`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sysinfo::{Disks, System};
use tracing::{debug, info, instrument, warn};
use upkeep_api::ResourceReport;
use upkeep_pkg::{EnvSnapshot, ManagerKind};

use crate::config::ResourceThresholds;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;
const BYTES_PER_MB: u64 = 1024 * 1024;
/// Assumed when available memory cannot be read
const FALLBACK_MEMORY_MB: u64 = 4096;
/// Below this, cleanup commands are suggested as well
const CLEANUP_HINT_GB: f64 = 5.0;
const MIN_REPOSITORIES: usize = 4;

/// A package repository probed for reachability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Repository {
    pub name: &'static str,
    pub url: &'static str,
    /// `None` for general-purpose endpoints that are always probed
    pub manager: Option<ManagerKind>,
}

/// Representative endpoints, general-purpose first
pub const REPOSITORIES: [Repository; 6] = [
    Repository {
        name: "GitHub",
        url: "https://api.github.com",
        manager: None,
    },
    Repository {
        name: "Homebrew",
        url: "https://formulae.brew.sh",
        manager: Some(ManagerKind::Brew),
    },
    Repository {
        name: "PyPI",
        url: "https://pypi.org/simple/pip/",
        manager: Some(ManagerKind::Pip),
    },
    Repository {
        name: "npm Registry",
        url: "https://registry.npmjs.org",
        manager: Some(ManagerKind::Npm),
    },
    Repository {
        name: "Ubuntu Archives",
        url: "http://archive.ubuntu.com/ubuntu/",
        manager: Some(ManagerKind::Apt),
    },
    Repository {
        name: "SDKMAN",
        url: "https://api.sdkman.io",
        manager: Some(ManagerKind::Sdkman),
    },
];

/// Reads disk and memory figures
pub trait SystemProbe: Send + Sync {
    /// Free bytes on the volume containing `path`
    fn available_disk_bytes(&self, path: &Path) -> Option<u64>;
    /// System-wide available memory in MB
    fn available_memory_mb(&self) -> Option<u64>;
    /// Resident memory of this process in MB
    fn process_memory_mb(&self) -> Option<u64>;
}

/// Checks whether a repository answers
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    async fn reachable(&self, repository: &Repository) -> bool;
}

/// [`SystemProbe`] backed by `sysinfo`
#[derive(Debug)]
pub struct SysinfoProbe {
    system: Mutex<System>,
}

impl SysinfoProbe {
    #[must_use]
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe for SysinfoProbe {
    fn available_disk_bytes(&self, path: &Path) -> Option<u64> {
        let disks = Disks::new_with_refreshed_list();
        // the most specific mount point containing the path
        disks
            .list()
            .iter()
            .filter(|disk| path.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(sysinfo::Disk::available_space)
    }

    fn available_memory_mb(&self) -> Option<u64> {
        let mut system = self.system.lock().ok()?;
        system.refresh_memory();
        let available = system.available_memory();
        (available > 0).then_some(available / BYTES_PER_MB)
    }

    fn process_memory_mb(&self) -> Option<u64> {
        let pid = sysinfo::get_current_pid().ok()?;
        let mut system = self.system.lock().ok()?;
        system.refresh_process(pid);
        system.process(pid).map(|p| p.memory() / BYTES_PER_MB)
    }
}

/// [`NetworkProbe`] sending HEAD requests, falling back to DNS resolution
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    /// Create a probe with the given per-request timeout
    ///
    /// # Errors
    /// Returns the client build error
    pub fn new(timeout: std::time::Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    async fn resolves(url: &str) -> bool {
        let Ok(parsed) = url::Url::parse(url) else {
            return false;
        };
        let (Some(host), Some(port)) = (parsed.host_str(), parsed.port_or_known_default()) else {
            return false;
        };
        tokio::net::lookup_host((host, port))
            .await
            .map(|mut addrs| addrs.next().is_some())
            .unwrap_or(false)
    }
}

#[async_trait]
impl NetworkProbe for HttpProbe {
    async fn reachable(&self, repository: &Repository) -> bool {
        match self.client.head(repository.url).send().await {
            Ok(response) => response.status().as_u16() < 400,
            Err(e) => {
                debug!(repository = repository.name, error = %e, "HEAD failed, trying DNS");
                Self::resolves(repository.url).await
            }
        }
    }
}

/// Runs the pre-flight check
#[derive(Clone)]
pub struct ResourceManager {
    system: Arc<dyn SystemProbe>,
    network: Arc<dyn NetworkProbe>,
    thresholds: ResourceThresholds,
    disk_path: PathBuf,
}

impl ResourceManager {
    /// Create a resource manager checking the volume of `disk_path`
    pub fn new(
        system: Arc<dyn SystemProbe>,
        network: Arc<dyn NetworkProbe>,
        thresholds: ResourceThresholds,
        disk_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            system,
            network,
            thresholds,
            disk_path: disk_path.into(),
        }
    }

    /// Real probes; disk space is checked for the home directory, else `cwd`
    ///
    /// # Errors
    /// Returns the HTTP client build error
    pub fn system(thresholds: ResourceThresholds, env: &EnvSnapshot) -> Result<Self, reqwest::Error> {
        let network = HttpProbe::new(thresholds.probe_timeout)?;
        let disk_path = env.home.clone().unwrap_or_else(|| env.cwd.clone());
        Ok(Self::new(
            Arc::new(SysinfoProbe::new()),
            Arc::new(network),
            thresholds,
            disk_path,
        ))
    }

    /// Shared system probe, for the resource monitor
    #[must_use]
    pub fn system_probe(&self) -> Arc<dyn SystemProbe> {
        Arc::clone(&self.system)
    }

    /// Check disk, network and memory for a worklist
    ///
    /// `package_counts` overrides the built-in per-manager estimates.
    #[instrument(skip(self, package_counts))]
    pub async fn check(
        &self,
        managers: &[ManagerKind],
        package_counts: &BTreeMap<ManagerKind, u32>,
    ) -> ResourceReport {
        let mut report = ResourceReport {
            estimated_download_mb: estimate_download_mb(managers, package_counts),
            ..ResourceReport::default()
        };

        self.check_disk(&mut report);
        self.check_network(&mut report, managers).await;
        self.check_memory(&mut report);
        report.recommendations = recommendations(&report);

        info!(
            disk_ok = report.disk_space_ok,
            available_gb = report.available_gb,
            required_gb = report.required_gb,
            reachable = report.reachable_repos,
            total = report.total_repos,
            memory_mb = report.available_memory_mb,
            "resource check"
        );
        report
    }

    fn check_disk(&self, report: &mut ResourceReport) {
        report.required_gb = required_disk_gb(report.estimated_download_mb, &self.thresholds);

        // fails closed: unknown free space is insufficient
        match self.system.available_disk_bytes(&self.disk_path) {
            Some(bytes) => {
                #[allow(clippy::cast_precision_loss)]
                let gb = bytes as f64 / BYTES_PER_GB;
                report.available_gb = gb;
                report.disk_space_ok = gb >= report.required_gb;
            }
            None => {
                warn!(path = %self.disk_path.display(), "could not determine free disk space");
                report.disk_space_ok = false;
                report.errors.push(format!(
                    "Disk space check failed: could not determine free space for {}",
                    self.disk_path.display()
                ));
            }
        }
    }

    async fn check_network(&self, report: &mut ResourceReport, managers: &[ManagerKind]) {
        let repositories = repositories_for(managers);
        report.total_repos = repositories.len();

        let mut reachable = 0;
        for repository in &repositories {
            if self.network.reachable(repository).await {
                reachable += 1;
            } else {
                debug!(repository = repository.name, url = repository.url, "unreachable");
            }
        }

        report.reachable_repos = reachable;
        report.network_ok = reachable > repositories.len() / 2;
    }

    fn check_memory(&self, report: &mut ResourceReport) {
        let available = self.system.available_memory_mb().unwrap_or_else(|| {
            debug!("available memory unknown, assuming {FALLBACK_MEMORY_MB}MB");
            FALLBACK_MEMORY_MB
        });
        report.available_memory_mb = available;
        report.memory_ok = available >= self.thresholds.min_memory_mb;
    }
}

/// Estimated total download in MB
///
/// Per manager: average package size times the package count, which falls
/// back to a conservative default. An estimate, not a measurement.
#[must_use]
pub fn estimate_download_mb(
    managers: &[ManagerKind],
    package_counts: &BTreeMap<ManagerKind, u32>,
) -> f64 {
    managers
        .iter()
        .map(|kind| {
            let count = package_counts
                .get(kind)
                .copied()
                .filter(|&n| n > 0)
                .unwrap_or_else(|| kind.default_package_count());
            kind.average_package_mb() * f64::from(count)
        })
        .sum()
}

/// Required free disk in GB: `max(min_disk_gb, download_gb * multiplier)`
#[must_use]
pub fn required_disk_gb(download_mb: f64, thresholds: &ResourceThresholds) -> f64 {
    (download_mb / 1024.0 * thresholds.disk_multiplier).max(thresholds.min_disk_gb)
}

/// Endpoints to probe for a worklist
///
/// General endpoints are always included; when fewer than four are
/// selected the first four known endpoints are used instead.
#[must_use]
pub fn repositories_for(managers: &[ManagerKind]) -> Vec<Repository> {
    let selected: Vec<Repository> = REPOSITORIES
        .iter()
        .filter(|r| r.manager.is_none_or(|m| managers.contains(&m)))
        .copied()
        .collect();

    if selected.len() < MIN_REPOSITORIES {
        REPOSITORIES[..MIN_REPOSITORIES].to_vec()
    } else {
        selected
    }
}

/// Actionable advice for each failing dimension
#[must_use]
pub fn recommendations(report: &ResourceReport) -> Vec<String> {
    let mut out = Vec::new();

    if !report.disk_space_ok {
        let shortfall = report.required_gb - report.available_gb;
        out.push(format!("Free up {shortfall:.1}GB disk space before proceeding"));
        if report.available_gb < CLEANUP_HINT_GB {
            out.push(
                "Consider running package manager cleanup commands (brew cleanup, apt autoremove, etc.)"
                    .to_string(),
            );
        }
    }

    if !report.network_ok {
        let failed = report.total_repos - report.reachable_repos;
        out.push(format!(
            "{failed}/{} repositories unreachable - check network connectivity",
            report.total_repos
        ));
        if report.reachable_repos == 0 {
            out.push("Check firewall settings, DNS configuration, or proxy settings".to_string());
        }
    }

    if !report.memory_ok {
        out.push(format!(
            "Low memory detected ({}MB) - close unnecessary applications",
            report.available_memory_mb
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSystem {
        disk_gb: Option<f64>,
        memory_mb: Option<u64>,
    }

    impl SystemProbe for FixedSystem {
        fn available_disk_bytes(&self, _path: &Path) -> Option<u64> {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            self.disk_gb.map(|gb| (gb * BYTES_PER_GB) as u64)
        }

        fn available_memory_mb(&self) -> Option<u64> {
            self.memory_mb
        }

        fn process_memory_mb(&self) -> Option<u64> {
            Some(42)
        }
    }

    struct Reachable(&'static [&'static str]);

    #[async_trait]
    impl NetworkProbe for Reachable {
        async fn reachable(&self, repository: &Repository) -> bool {
            self.0.contains(&repository.name)
        }
    }

    fn manager(disk_gb: Option<f64>, reachable: &'static [&'static str]) -> ResourceManager {
        ResourceManager::new(
            Arc::new(FixedSystem {
                disk_gb,
                memory_mb: Some(8192),
            }),
            Arc::new(Reachable(reachable)),
            ResourceThresholds::default(),
            "/home/dev",
        )
    }

    const ALL_REPOS: &[&str] = &["GitHub", "Homebrew", "PyPI", "npm Registry", "Ubuntu Archives", "SDKMAN"];

    #[test]
    fn test_required_disk_has_one_gb_floor() {
        let thresholds = ResourceThresholds::default();
        assert!((required_disk_gb(100.0, &thresholds) - 1.0).abs() < f64::EPSILON);
        assert!((required_disk_gb(2048.0, &thresholds) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_estimate_uses_defaults_and_overrides() {
        let defaults = estimate_download_mb(&[ManagerKind::Brew], &BTreeMap::new());
        assert!((defaults - 42.5).abs() < 1e-9);

        let counts = BTreeMap::from([(ManagerKind::Brew, 2)]);
        let counted = estimate_download_mb(&[ManagerKind::Brew], &counts);
        assert!((counted - 17.0).abs() < 1e-9);
    }

    #[test]
    fn test_repositories_always_include_general() {
        let repos = repositories_for(&[ManagerKind::Brew, ManagerKind::Pip, ManagerKind::Npm]);
        assert_eq!(repos[0].name, "GitHub");
        assert_eq!(repos.len(), 4);

        let minimal = repositories_for(&[ManagerKind::Yay]);
        assert_eq!(minimal.len(), 4);
        assert_eq!(minimal[3].name, "npm Registry");
    }

    #[tokio::test]
    async fn test_low_disk_fails_with_recommendations() {
        let report = manager(Some(0.5), ALL_REPOS)
            .check(&[ManagerKind::Brew], &BTreeMap::new())
            .await;

        assert!(!report.disk_space_ok);
        assert!(!report.passed());
        assert_eq!(report.recommendations[0], "Free up 0.5GB disk space before proceeding");
        assert!(report.recommendations[1].starts_with("Consider running package manager cleanup"));
    }

    #[tokio::test]
    async fn test_unknown_disk_fails_closed() {
        let report = manager(None, ALL_REPOS)
            .check(&[ManagerKind::Brew], &BTreeMap::new())
            .await;

        assert!(!report.disk_space_ok);
        assert_eq!(report.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_partial_reachability_is_not_fatal() {
        let report = manager(Some(100.0), &["GitHub"])
            .check(&[ManagerKind::Brew], &BTreeMap::new())
            .await;

        assert!(!report.network_ok);
        assert!(report.passed());
        assert_eq!(
            report.recommendations,
            vec!["3/4 repositories unreachable - check network connectivity"]
        );
    }

    #[tokio::test]
    async fn test_nothing_reachable_fails() {
        let report = manager(Some(100.0), &[])
            .check(&[ManagerKind::Apt], &BTreeMap::new())
            .await;

        assert!(!report.passed());
        assert_eq!(
            report.recommendations.last().map(String::as_str),
            Some("Check firewall settings, DNS configuration, or proxy settings")
        );
    }
}
