//! UI Theme - icons and formatting shared by every command.

/// Status icons printed in front of each progress line
#[derive(Debug, Clone)]
pub struct Icons {
    /// Queued, being fetched (○)
    pub pending: &'static str,
    /// Being installed or running a script (●)
    pub active: &'static str,
    /// Installed (✓)
    pub success: &'static str,
    /// Failed (✗)
    pub error: &'static str,
    /// Conflicts and other warnings (⚠)
    pub warning: &'static str,
    /// Informational (ℹ)
    pub info: &'static str,
}

impl Default for Icons {
    fn default() -> Self {
        Self {
            pending: "○",
            active: "●",
            success: "✓",
            error: "✗",
            warning: "⚠",
            info: "ℹ",
        }
    }
}

/// Format bytes for human-readable display
pub fn format_size(bytes: u64) -> String {
    let kb = bytes as f64 / 1024.0;
    let mb = kb / 1024.0;
    if mb >= 1024.0 {
        format!("{:.1} GB", mb / 1024.0)
    } else if kb >= 1024.0 {
        format!("{mb:.1} MB")
    } else if kb >= 1.0 {
        format!("{kb:.1} KB")
    } else {
        format!("{bytes} B")
    }
}
