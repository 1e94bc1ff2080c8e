//! Workspace Provisioning
//!
//! Materialises an isolated workspace for one trial: a private VCS root, a
//! verbatim copy of the template, neutralised artifacts for every disabled
//! capability, and a base state descriptor. Everything happens inside the
//! given directory.

use crate::variant::{CapabilityTable, VariantConfig, VariantError};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// File name of the state descriptor written into every workspace
pub const STATE_FILE: &str = "state.json";

/// Provisioning failure. Recoverable: the trial is skipped.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("VCS initialisation failed in {path}: {message}")]
    Vcs { path: PathBuf, message: String },

    #[error(transparent)]
    Variant(#[from] VariantError),

    #[error("failed to serialize state descriptor: {0}")]
    State(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ProvisionError + '_ {
    move |source| ProvisionError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Whether a fresh version-control root is created in each workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VcsInit {
    /// `git init` inside the workspace
    #[default]
    Git,
    /// No VCS root
    Skip,
}

/// Shapes a workspace for a variant.
///
/// `provision` never fails loudly: any error is logged and reported as
/// `false` so the caller can skip the trial.
pub trait Provision: Send + Sync {
    fn try_provision(
        &self,
        workspace_root: &Path,
        variant: &VariantConfig,
    ) -> Result<(), ProvisionError>;

    fn provision(&self, workspace_root: &Path, variant: &VariantConfig) -> bool {
        match self.try_provision(workspace_root, variant) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    variant = variant.name(),
                    workspace = %workspace_root.display(),
                    error = %e,
                    "provisioning failed"
                );
                false
            }
        }
    }
}

/// Base state every timed operation can rely on
#[derive(Debug, Clone, Serialize)]
struct StateDescriptor<'a> {
    project: &'a str,
    phase: &'a str,
    checkpoint_count: u64,
    variant: &'a str,
}

/// Default [`Provision`] implementation driven by a [`CapabilityTable`]
#[derive(Debug, Clone)]
pub struct VariantProvisioner {
    table: CapabilityTable,
    template: Option<PathBuf>,
    vcs: VcsInit,
    project: String,
    phase: String,
}

impl VariantProvisioner {
    pub fn new(table: CapabilityTable) -> Self {
        Self {
            table,
            template: None,
            vcs: VcsInit::default(),
            project: "trialbench".to_string(),
            phase: "baseline".to_string(),
        }
    }

    /// Directory copied verbatim into every workspace
    pub fn with_template(mut self, template: impl Into<PathBuf>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_vcs(mut self, vcs: VcsInit) -> Self {
        self.vcs = vcs;
        self
    }

    /// Project identity recorded in the state descriptor
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    /// Current phase recorded in the state descriptor
    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = phase.into();
        self
    }

    pub fn table(&self) -> &CapabilityTable {
        &self.table
    }

    fn init_vcs(&self, root: &Path) -> Result<(), ProvisionError> {
        if self.vcs == VcsInit::Skip {
            return Ok(());
        }

        let output = Command::new("git")
            .args(["init", "--quiet"])
            .current_dir(root)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| ProvisionError::Vcs {
                path: root.to_path_buf(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(ProvisionError::Vcs {
                path: root.to_path_buf(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    fn neutralize_disabled(
        &self,
        root: &Path,
        variant: &VariantConfig,
    ) -> Result<(), ProvisionError> {
        for capability in self.table.iter() {
            if variant.is_enabled(&capability.name) {
                continue;
            }

            let target = root.join(&capability.path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(io_error(parent))?;
            }
            fs::write(&target, capability.neutralization.contents())
                .map_err(io_error(&target))?;
            if capability.neutralization.is_executable() {
                make_executable(&target)?;
            }
            debug!(
                variant = variant.name(),
                capability = %capability.name,
                "neutralised capability"
            );
        }
        Ok(())
    }

    fn write_state(&self, root: &Path, variant: &VariantConfig) -> Result<(), ProvisionError> {
        let state = StateDescriptor {
            project: &self.project,
            phase: &self.phase,
            checkpoint_count: 0,
            variant: variant.name(),
        };
        let mut json = serde_json::to_string_pretty(&state)?;
        json.push('\n');

        let path = root.join(STATE_FILE);
        fs::write(&path, json).map_err(io_error(&path))
    }
}

impl Provision for VariantProvisioner {
    fn try_provision(
        &self,
        workspace_root: &Path,
        variant: &VariantConfig,
    ) -> Result<(), ProvisionError> {
        self.table.validate(variant)?;

        fs::create_dir_all(workspace_root).map_err(io_error(workspace_root))?;
        self.init_vcs(workspace_root)?;

        if let Some(template) = &self.template {
            copy_tree(template, workspace_root)?;
        }

        self.neutralize_disabled(workspace_root, variant)?;
        self.write_state(workspace_root, variant)
    }
}

/// Recursively copy `src` into `dst`, skipping any `.git` directory.
///
/// Symlinks are resolved and their targets copied. Broken links, and links
/// back into one of their own ancestors, are recreated as links.
fn copy_tree(src: &Path, dst: &Path) -> Result<(), ProvisionError> {
    let walker = WalkDir::new(src)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0 || !(e.file_type().is_dir() && e.file_name() == ".git")
        });

    for entry in walker {
        let entry = entry.map_err(|e| walk_error(src, e))?;
        let path = entry.path();
        let Ok(rel) = path.strip_prefix(src) else {
            continue;
        };
        if rel.as_os_str().is_empty() {
            continue;
        }

        let target = dst.join(rel);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(io_error(&target))?;
        } else if file_type.is_symlink() {
            copy_link(path, &target)?;
        } else if file_type.is_file() {
            fs::copy(path, &target).map_err(io_error(path))?;
        }
    }
    Ok(())
}

fn copy_link(link: &Path, target: &Path) -> Result<(), ProvisionError> {
    match fs::canonicalize(link) {
        Ok(real) if real.is_dir() => {
            let cyclic = link
                .parent()
                .and_then(|parent| fs::canonicalize(parent).ok())
                .is_some_and(|parent| parent.starts_with(&real));
            if cyclic {
                return recreate_link(link, target);
            }
            fs::create_dir_all(target).map_err(io_error(target))?;
            copy_tree(&real, target)
        }
        Ok(real) if real.is_file() => {
            fs::copy(&real, target).map_err(io_error(&real))?;
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(_) => recreate_link(link, target),
    }
}

#[cfg(unix)]
fn recreate_link(link: &Path, target: &Path) -> Result<(), ProvisionError> {
    let destination = fs::read_link(link).map_err(io_error(link))?;
    std::os::unix::fs::symlink(destination, target).map_err(io_error(target))
}

#[cfg(not(unix))]
fn recreate_link(_link: &Path, _target: &Path) -> Result<(), ProvisionError> {
    Ok(())
}

fn walk_error(root: &Path, err: walkdir::Error) -> ProvisionError {
    let path = err.path().unwrap_or(root).to_path_buf();
    let source = err
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::other("filesystem loop in template"));
    ProvisionError::Io { path, source }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), ProvisionError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(io_error(path))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<(), ProvisionError> {
    Ok(())
}
