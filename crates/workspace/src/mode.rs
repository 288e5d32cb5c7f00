//! Workspace materialization strategy selection.

/// Which strategy materializes a task's workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceMode {
    /// Unzip into a fresh host temp directory, bind-mounted into steps.
    Bind,
    /// Copy into a named container volume, mounted into steps.
    Volume,
    /// Resolve to [`WorkspaceMode::Bind`] or [`WorkspaceMode::Volume`]
    /// depending on whether the host platform reliably exposes arbitrary
    /// temp-directory paths to the container runtime.
    Auto,
}

impl WorkspaceMode {
    /// Resolve `Auto` to a concrete strategy. Bind-mounts of arbitrary host
    /// paths are reliable on native Linux container hosts; everywhere else
    /// (notably container-runtime-in-a-VM setups) a named volume sidesteps
    /// the container engine needing to see the host temp prefix.
    #[must_use]
    pub const fn resolve(self) -> Self {
        match self {
            Self::Auto => {
                if cfg!(target_os = "linux") {
                    Self::Bind
                } else {
                    Self::Volume
                }
            }
            concrete => concrete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_and_volume_resolve_to_themselves() {
        assert_eq!(WorkspaceMode::Bind.resolve(), WorkspaceMode::Bind);
        assert_eq!(WorkspaceMode::Volume.resolve(), WorkspaceMode::Volume);
    }

    #[test]
    fn auto_resolves_to_a_concrete_mode() {
        assert_ne!(WorkspaceMode::Auto.resolve(), WorkspaceMode::Auto);
    }
}
