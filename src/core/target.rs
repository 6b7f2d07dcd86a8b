//! Build targets and their environment descriptors.

use serde::Serialize;
use std::fmt;

/// A logical build target. Each target gets its own assembled config,
/// compiler instance and artifact set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Target {
    Web,
    Server,
    Cordova,
}

impl Target {
    /// Derive the target from a platform/arch string supplied by the host
    /// (e.g. "web.browser", "os.linux.x86_64", "web.cordova").
    pub fn from_arch(arch: &str) -> Self {
        if arch.contains("cordova") {
            Self::Cordova
        } else if arch.contains("web") {
            Self::Web
        } else {
            Self::Server
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Server => "server",
            Self::Cordova => "cordova",
        }
    }

    /// Output filename for the primary script artifact.
    pub fn bundle_filename(self) -> String {
        format!("{}.js", self.as_str())
    }

    /// A dev server never applies to the server target.
    pub fn supports_dev_server(self) -> bool {
        !matches!(self, Self::Server)
    }

    /// Environment descriptor exposed to config fragments.
    pub fn env(self) -> EnvDescriptor {
        EnvDescriptor {
            is_server: matches!(self, Self::Server),
            is_client: !matches!(self, Self::Server),
            is_cordova: matches!(self, Self::Cordova),
        }
    }

    /// All targets in compile order: clients first, server last, so the
    /// web chunk manifest exists before the server script embeds it.
    pub const COMPILE_ORDER: [Target; 3] = [Target::Web, Target::Cordova, Target::Server];
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed environment descriptor a config fragment can branch on.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EnvDescriptor {
    pub is_server: bool,
    pub is_client: bool,
    pub is_cordova: bool,
}

impl EnvDescriptor {
    /// Name of the `[when.<name>]` overlay table selecting this environment.
    pub fn overlay_names(self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.is_server {
            names.push("server");
        }
        if self.is_client {
            names.push("client");
        }
        if self.is_cordova {
            names.push("cordova");
        }
        names
    }
}
