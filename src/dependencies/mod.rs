//! Native dependency provisioning for the embedded LanceDB driver.
//!
//! The driver ships as a prebuilt per-platform package. It is installed into
//! an isolated directory with the configured package manager the first time a
//! store needs it, and its `node_modules` directory is then handed to the
//! driver as its module path.

pub mod platform;


use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::{CodeIndexError, Result};
pub use platform::{Libc, Target};

/// Core driver package
pub const LANCEDB_PACKAGE: &str = "@lancedb/lancedb";
/// Driver version the on-disk format is pinned to
pub const PINNED_VERSION: &str = "0.21.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPhase {
    Installing,
    Completed,
}

/// Receives installation progress
pub trait ProgressSink: Send + Sync {
    fn report(&self, phase: InstallPhase, message: &str);
}

/// Discards progress
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    #[inline]
    fn report(&self, _phase: InstallPhase, _message: &str) {}
}

/// Terminal spinner used by the CLI
pub struct SpinnerProgress {
    bar: ProgressBar,
}

impl SpinnerProgress {
    #[inline]
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            bar.set_style(style);
        }
        Self { bar }
    }
}

impl Default for SpinnerProgress {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for SpinnerProgress {
    #[inline]
    fn report(&self, phase: InstallPhase, message: &str) {
        match phase {
            InstallPhase::Installing => {
                self.bar.enable_steady_tick(Duration::from_millis(100));
                self.bar.set_message(message.to_string());
            }
            InstallPhase::Completed => {
                self.bar.finish_with_message(message.to_string());
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct PackageManifest {
    version: Option<String>,
}

/// Installs and locates the platform's LanceDB driver bundle
#[derive(Debug, Clone)]
pub struct DependencyManager {
    /// Isolated install directory holding `package.json` and `node_modules`
    deps_dir: PathBuf,
    target: Target,
    /// Executable name or path, invoked as `<package_manager> install`
    package_manager: String,
}

impl DependencyManager {
    /// Manager for the running platform
    #[inline]
    pub fn new(deps_dir: impl Into<PathBuf>, package_manager: impl Into<String>) -> Result<Self> {
        Ok(Self::with_target(
            deps_dir,
            Target::current()?,
            package_manager,
        ))
    }

    #[inline]
    pub fn with_target(
        deps_dir: impl Into<PathBuf>,
        target: Target,
        package_manager: impl Into<String>,
    ) -> Self {
        Self {
            deps_dir: deps_dir.into(),
            target,
            package_manager: package_manager.into(),
        }
    }

    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.dependency_dir(),
            config.dependencies.package_manager.trim(),
        )
    }

    #[inline]
    pub fn deps_dir(&self) -> &Path {
        &self.deps_dir
    }

    #[inline]
    pub fn target(&self) -> Target {
        self.target
    }

    /// Directory the embedded driver resolves its native modules from
    #[inline]
    pub fn module_path(&self) -> PathBuf {
        self.deps_dir.join("node_modules")
    }

    fn core_package_dir(&self) -> PathBuf {
        self.module_path().join(LANCEDB_PACKAGE)
    }

    fn binary_path(&self) -> PathBuf {
        self.module_path()
            .join(self.target.package_name())
            .join(self.target.binary_name())
    }

    /// Whether the pinned driver and this platform's binary are installed
    #[inline]
    pub fn check_binaries(&self) -> bool {
        let core = self.core_package_dir();
        if !core.is_dir() || !core.join("dist").is_dir() {
            debug!(path = %core.display(), "LanceDB core package missing");
            return false;
        }

        let binary = self.binary_path();
        if !binary.is_file() {
            debug!(path = %binary.display(), "LanceDB native binary missing");
            return false;
        }

        match installed_version(&core.join("package.json")) {
            Ok(Some(version)) if version == PINNED_VERSION => true,
            Ok(version) => {
                debug!(
                    installed = ?version,
                    pinned = PINNED_VERSION,
                    "LanceDB version does not match pinned version"
                );
                false
            }
            Err(e) => {
                debug!("Failed to read LanceDB package manifest: {}", e);
                false
            }
        }
    }

    /// Install the driver bundle unless it is already present
    pub async fn ensure_available(&self, progress: &dyn ProgressSink) -> Result<()> {
        if self.check_binaries() {
            debug!(path = %self.deps_dir.display(), "LanceDB driver already installed");
            return Ok(());
        }

        let package = format!("{}@{}", LANCEDB_PACKAGE, PINNED_VERSION);
        info!(
            package = %package,
            platform = self.target.triple(),
            directory = %self.deps_dir.display(),
            "Installing native LanceDB driver"
        );
        progress.report(
            InstallPhase::Installing,
            &format!("Installing {} for {}", package, self.target.triple()),
        );

        self.write_package_descriptor().await?;
        self.run_install(&package).await?;

        if !self.check_binaries() {
            return Err(CodeIndexError::Dependency(format!(
                "{} installed but the {} binary was not found at {}",
                package,
                self.target.triple(),
                self.binary_path().display()
            )));
        }

        info!(package = %package, "Native LanceDB driver installed");
        progress.report(InstallPhase::Completed, &format!("Installed {}", package));
        Ok(())
    }

    async fn write_package_descriptor(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.deps_dir).await?;

        let descriptor = serde_json::json!({
            "name": "code-index-native-deps",
            "private": true,
            "dependencies": { LANCEDB_PACKAGE: PINNED_VERSION },
        });
        let content = serde_json::to_string_pretty(&descriptor)
            .map_err(|e| CodeIndexError::Dependency(format!("Failed to encode package.json: {}", e)))?;

        tokio::fs::write(self.deps_dir.join("package.json"), content).await?;
        Ok(())
    }

    async fn run_install(&self, package: &str) -> Result<()> {
        let program = which::which(&self.package_manager).map_err(|e| {
            CodeIndexError::Dependency(format!(
                "Package manager '{}' not found while installing {}: {}",
                self.package_manager, package, e
            ))
        })?;

        let output = tokio::process::Command::new(&program)
            .arg("install")
            .current_dir(&self.deps_dir)
            .output()
            .await
            .map_err(|e| {
                CodeIndexError::Dependency(format!(
                    "Failed to run '{} install' for {}: {}",
                    program.display(),
                    package,
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let log = [stderr.trim(), stdout.trim()]
                .into_iter()
                .filter(|text| !text.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            warn!(status = %output.status, "Package manager install failed");
            return Err(CodeIndexError::Dependency(format!(
                "'{} install' failed for {} ({}): {}",
                self.package_manager, package, output.status, log
            )));
        }

        Ok(())
    }
}

fn installed_version(manifest: &Path) -> anyhow::Result<Option<String>> {
    let content = std::fs::read_to_string(manifest)?;
    let manifest: PackageManifest = serde_json::from_str(&content)?;
    Ok(manifest.version)
}
