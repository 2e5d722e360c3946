// src/system/shell.rs

//! # Shell Detection
//!
//! Works out which shell flavor the user is typing into, so shell-specific
//! templates can be chosen. Detection results are cached against a fingerprint
//! of the environment variables that tell shells apart; the cache is trusted
//! only while the fingerprint is unchanged.

use crate::models::ShellType;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

const HASH_TRUNCATE_LENGTH: usize = 16; // 16 bytes = 32 hex characters

/// The variables that distinguish PowerShell, Git-Bash, WSL, CI, Nx-driven and
/// VSCode-integrated contexts. Their values make up the fingerprint.
const FINGERPRINT_VARS: &[&str] = &[
    "PSModulePath",
    "POWERSHELL_DISTRIBUTION_CHANNEL",
    "PSExecutionPolicyPreference",
    "MSYSTEM",
    "WSL_DISTRO_NAME",
    "WSL_INTEROP",
    "SHELL",
    "ComSpec",
    "TERM_PROGRAM",
    "VSCODE_PID",
    "CI",
    "NX_TASK_HASH",
    "NX_TASK_TARGET_PROJECT",
    "NX_WORKSPACE_ROOT",
];

/// A source of environment variables. Production code reads the process
/// environment; tests supply their own.
pub trait EnvSource: Send + Sync {
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads from the real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// The cached outcome of the last detection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellDetectionCache {
    pub fingerprint: Option<String>,
    pub shell_type: Option<ShellType>,
}

pub struct ShellDetector {
    env: Box<dyn EnvSource>,
    cache: Mutex<ShellDetectionCache>,
    raw_detections: AtomicUsize,
}

impl fmt::Debug for ShellDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellDetector")
            .field("cache", &self.cache)
            .field("raw_detections", &self.raw_detections)
            .finish_non_exhaustive()
    }
}

impl ShellDetector {
    pub fn new(env: Box<dyn EnvSource>) -> Self {
        Self {
            env,
            cache: Mutex::new(ShellDetectionCache::default()),
            raw_detections: AtomicUsize::new(0),
        }
    }

    pub fn from_process_env() -> Self {
        Self::new(Box::new(ProcessEnv))
    }

    /// Returns the shell type, re-detecting only when the environment
    /// fingerprint differs from the cached one.
    pub fn detect_shell_type_cached(&self) -> ShellType {
        let fingerprint = self.fingerprint();
        let mut cache = self
            .cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let (Some(cached_fp), Some(shell_type)) = (&cache.fingerprint, cache.shell_type) {
            if *cached_fp == fingerprint {
                log::trace!("Shell detection cache hit: {}", shell_type);
                return shell_type;
            }
            log::debug!("Environment fingerprint changed; re-detecting shell.");
        }

        let shell_type = self.detect_shell_type_raw();
        *cache = ShellDetectionCache {
            fingerprint: Some(fingerprint),
            shell_type: Some(shell_type),
        };
        shell_type
    }

    /// Detects the shell from the environment without touching the cache.
    pub fn detect_shell_type_raw(&self) -> ShellType {
        self.raw_detections.fetch_add(1, Ordering::Relaxed);
        let has = |key: &str| self.env.var(key).is_some_and(|v| !v.is_empty());

        let shell_type = if has("POWERSHELL_DISTRIBUTION_CHANNEL")
            || has("PSExecutionPolicyPreference")
        {
            ShellType::Pwsh
        } else if has("MSYSTEM") || has("WSL_DISTRO_NAME") || has("WSL_INTEROP") {
            ShellType::Linux
        } else if self.env.var("TERM_PROGRAM").as_deref() == Some("vscode")
            && has("PSModulePath")
            && !has("SHELL")
        {
            // VSCode's integrated terminal on Windows defaults to PowerShell.
            ShellType::Pwsh
        } else if self
            .env
            .var("SHELL")
            .is_some_and(|shell| is_posix_shell(&shell))
        {
            ShellType::Linux
        } else if has("ComSpec") {
            ShellType::Cmd
        } else {
            ShellType::Unknown
        };

        log::debug!("Raw shell detection result: {}", shell_type);
        shell_type
    }

    pub fn clear_shell_detection_cache(&self) {
        let mut cache = self
            .cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *cache = ShellDetectionCache::default();
    }

    /// A snapshot of the cache, for diagnostics.
    pub fn cache_snapshot(&self) -> ShellDetectionCache {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// How many times raw detection has run.
    pub fn raw_detection_count(&self) -> usize {
        self.raw_detections.load(Ordering::Relaxed)
    }

    /// A stable digest of the shell-relevant environment.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for key in FINGERPRINT_VARS {
            hasher.update(key.as_bytes());
            match self.env.var(key) {
                Some(value) => {
                    hasher.update(b"=");
                    hasher.update(value.as_bytes());
                }
                None => {
                    hasher.update(b"\0unset");
                }
            }
            hasher.update(b"\n");
        }
        let hash = hasher.finalize();
        let bytes = hash.as_bytes();
        hex::encode(bytes.get(..HASH_TRUNCATE_LENGTH).unwrap_or(bytes))
    }

    /// Whether the process appears to be running inside an Nx task.
    pub fn is_nx_task_context(&self) -> bool {
        ["NX_TASK_HASH", "NX_TASK_TARGET_PROJECT", "NX_WORKSPACE_ROOT"]
            .iter()
            .any(|key| self.env.var(key).is_some())
    }
}

fn is_posix_shell(shell_path: &str) -> bool {
    let name = shell_path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(shell_path)
        .trim_end_matches(".exe");
    matches!(name, "bash" | "zsh" | "sh" | "dash" | "ksh" | "fish" | "ash")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, RwLock};

    /// An environment that can change between calls.
    #[derive(Clone, Default)]
    struct MutableEnv(Arc<RwLock<HashMap<String, String>>>);

    impl MutableEnv {
        fn set(&self, key: &str, value: &str) {
            self.0
                .write()
                .unwrap()
                .insert(key.to_string(), value.to_string());
        }
    }

    impl EnvSource for MutableEnv {
        fn var(&self, key: &str) -> Option<String> {
            self.0.read().unwrap().get(key).cloned()
        }
    }

    fn detector_with(pairs: &[(&str, &str)]) -> ShellDetector {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ShellDetector::new(Box::new(env))
    }

    #[test]
    fn test_raw_detection_policy() {
        assert_eq!(
            detector_with(&[("POWERSHELL_DISTRIBUTION_CHANNEL", "MSI:Windows 10")])
                .detect_shell_type_raw(),
            ShellType::Pwsh
        );
        assert_eq!(
            detector_with(&[("TERM_PROGRAM", "vscode"), ("PSModulePath", "C:\\ps")])
                .detect_shell_type_raw(),
            ShellType::Pwsh
        );
        assert_eq!(
            detector_with(&[("MSYSTEM", "MINGW64"), ("PSModulePath", "C:\\ps")])
                .detect_shell_type_raw(),
            ShellType::Linux
        );
        assert_eq!(
            detector_with(&[("WSL_DISTRO_NAME", "Ubuntu")]).detect_shell_type_raw(),
            ShellType::Linux
        );
        assert_eq!(
            detector_with(&[("SHELL", "/usr/bin/zsh")]).detect_shell_type_raw(),
            ShellType::Linux
        );
        assert_eq!(
            detector_with(&[("ComSpec", "C:\\Windows\\system32\\cmd.exe")])
                .detect_shell_type_raw(),
            ShellType::Cmd
        );
        assert_eq!(detector_with(&[]).detect_shell_type_raw(), ShellType::Unknown);
    }

    #[test]
    fn test_cache_hits_with_unchanged_environment() {
        let detector = detector_with(&[("SHELL", "/bin/bash")]);

        let first = detector.detect_shell_type_cached();
        let second = detector.detect_shell_type_cached();

        assert_eq!(first, second);
        assert_eq!(detector.raw_detection_count(), 1);
    }

    #[test]
    fn test_clear_forces_redetection() {
        let detector = detector_with(&[("SHELL", "/bin/bash")]);
        detector.detect_shell_type_cached();
        detector.clear_shell_detection_cache();

        assert_eq!(detector.cache_snapshot(), ShellDetectionCache::default());
        detector.detect_shell_type_cached();
        assert_eq!(detector.raw_detection_count(), 2);
    }

    #[test]
    fn test_fingerprint_change_invalidates_cache() {
        let env = MutableEnv::default();
        env.set("SHELL", "/bin/bash");
        let detector = ShellDetector::new(Box::new(env.clone()));

        assert_eq!(detector.detect_shell_type_cached(), ShellType::Linux);
        let first_fp = detector.fingerprint();

        env.set("POWERSHELL_DISTRIBUTION_CHANNEL", "MSI");
        assert_ne!(detector.fingerprint(), first_fp);
        assert_eq!(detector.detect_shell_type_cached(), ShellType::Pwsh);
        assert_eq!(detector.raw_detection_count(), 2);
    }

    #[test]
    fn test_fingerprint_is_stable_and_truncated() {
        let a = detector_with(&[("CI", "true")]);
        let b = detector_with(&[("CI", "true")]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), HASH_TRUNCATE_LENGTH * 2);

        // An empty value is not the same as an unset variable.
        let empty = detector_with(&[("CI", "")]);
        assert_ne!(empty.fingerprint(), detector_with(&[]).fingerprint());
    }

    #[test]
    fn test_nx_task_context() {
        assert!(detector_with(&[("NX_TASK_HASH", "abc")]).is_nx_task_context());
        assert!(!detector_with(&[("CI", "1")]).is_nx_task_context());
    }
}
