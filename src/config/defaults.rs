//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

// ============================================================================
// Common Defaults
// ============================================================================

pub fn r#false() -> bool {
    false
}

// ============================================================================
// [build] Section Defaults
// ============================================================================

pub mod build {
    use std::path::PathBuf;

    pub fn source() -> PathBuf {
        "src".into()
    }

    pub fn output() -> PathBuf {
        "dist".into()
    }

    pub fn include_dir() -> String {
        "include".into()
    }

    pub mod stylesheet {
        pub fn command() -> Vec<String> {
            vec!["sass".into(), "--no-source-map".into()]
        }

        pub fn autoprefix_command() -> Vec<String> {
            vec!["postcss".into(), "--use".into(), "autoprefixer".into()]
        }
    }

    pub mod script {
        pub fn command() -> Vec<String> {
            vec!["babel".into()]
        }
    }
}

// ============================================================================
// [serve] Section Defaults
// ============================================================================

pub mod serve {
    pub fn interface() -> String {
        "127.0.0.1".into()
    }

    pub fn port() -> u16 {
        3000
    }
}

// ============================================================================
// [watch] Section Defaults
// ============================================================================

pub mod watch {
    /// Editors on some platforms keep the file locked briefly after saving.
    pub fn settle_ms() -> u64 {
        100
    }

    pub fn retries() -> u32 {
        3
    }
}
