//! Build mode and invocation flags.

use super::Target;

/// Development vs production build mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    Development,
    Production,
}

impl BuildMode {
    pub fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }

    /// Value injected for the NODE_ENV compile-time constant. Always the
    /// orchestrator's own computed mode, never the raw environment value.
    pub fn node_env(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

/// Flags describing one build invocation from the host.
#[derive(Debug, Clone, Copy)]
pub struct Invocation {
    pub mode: BuildMode,
    /// One-shot build/bundle/deploy run (no long-lived server).
    pub one_shot: bool,
    /// Non-interactive mirror/test execution.
    pub mirror: bool,
}

impl Invocation {
    pub fn development() -> Self {
        Self {
            mode: BuildMode::Development,
            one_shot: false,
            mirror: false,
        }
    }

    pub fn production() -> Self {
        Self {
            mode: BuildMode::Production,
            one_shot: true,
            mirror: false,
        }
    }

    /// Whether this target is served by the dev server instead of being
    /// compiled once and packaged.
    pub fn uses_dev_server(&self, target: Target) -> bool {
        self.mode.is_development() && !self.one_shot && target.supports_dev_server() && !self.mirror
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_env_follows_mode() {
        assert_eq!(BuildMode::Development.node_env(), "development");
        assert_eq!(BuildMode::Production.node_env(), "production");
    }

    #[test]
    fn test_dev_server_applicability() {
        let dev = Invocation::development();
        assert!(dev.uses_dev_server(Target::Web));
        assert!(dev.uses_dev_server(Target::Cordova));
        assert!(!dev.uses_dev_server(Target::Server));

        let prod = Invocation::production();
        assert!(!prod.uses_dev_server(Target::Web));

        let mirror = Invocation {
            mirror: true,
            ..Invocation::development()
        };
        assert!(!mirror.uses_dev_server(Target::Web));
    }
}
