//! Test utilities and global setup
//!
//! Provides centralized test logging configuration and the fake indexer
//! executable the subprocess tests drive.

/// Test logging utilities
#[cfg(all(test, feature = "test-logging"))]
pub mod logging {
    use std::sync::Once;
    use tracing_subscriber::{EnvFilter, fmt};

    static INIT: Once = Once::new();

    /// Initialize test logging globally - safe to call multiple times
    ///
    /// Respects RUST_LOG with sensible defaults and uses the test writer so
    /// logs do not interfere with test output.
    pub fn init() {
        INIT.call_once(|| {
            let env_filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("debug,tokio=info"));

            fmt()
                .with_env_filter(env_filter)
                .with_test_writer()
                .with_target(true)
                .with_thread_ids(true)
                .compact()
                .try_init()
                .ok(); // Ignore errors if already initialized by another test
        });
    }
}

/// Global test logging setup
///
/// Add this to any test module where you want automatic logging
/// initialization.
#[cfg(all(test, feature = "test-logging"))]
#[macro_export]
macro_rules! setup_test_logging {
    () => {
        #[ctor::ctor]
        fn init_test_logging() {
            $crate::test_utils::logging::init();
        }
    };
}

#[cfg(test)]
pub use fake_indexer::FakeIndexer;

/// A scripted stand-in for the real indexer executable
///
/// Installs a shell script that speaks the indexer's CLI surface
/// (`--index-root <dir> add|query|status ...`), records every invocation,
/// and reacts to knobs the test flips through control files. Tests drive
/// real subprocess spawning, pipes and exit codes without a real indexer.
#[cfg(test)]
mod fake_indexer {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    use crate::indexer::config::IndexerConfig;

    pub struct FakeIndexer {
        ctl_dir: PathBuf,
        script_path: PathBuf,
    }

    impl FakeIndexer {
        /// Install the fake indexer script under `dir`
        pub fn install(dir: &Path) -> Self {
            let ctl_dir = dir.join("fake-indexer");
            fs::create_dir_all(&ctl_dir).unwrap();

            let script_path = ctl_dir.join("kwindexer");
            let script = format!(
                r#"#!/bin/sh
ctl='{ctl}'
echo "$*" >> "$ctl/invocations.log"
root="$2"
cmd="$3"
case "$cmd" in
  add)
    echo "$GOMAXPROCS" > "$ctl/gomaxprocs"
    echo x >> "$ctl/add-count"
    if [ -f "$ctl/add-delay" ]; then
      sleep "$(cat "$ctl/add-delay")"
    fi
    if [ -f "$ctl/add-fail" ]; then
      echo "index build exploded" >&2
      exit 1
    fi
    mkdir -p "$root"
    echo '{{}}' > "$root/index.json"
    ;;
  query)
    if [ -f "$ctl/query-fail" ]; then
      cat "$ctl/query-fail" >&2
      exit 1
    fi
    cat "$ctl/query-output.json"
    ;;
  status)
    cat "$ctl/status-output.json"
    ;;
esac
"#,
                ctl = ctl_dir.display()
            );
            fs::write(&script_path, script).unwrap();
            fs::set_permissions(&script_path, fs::Permissions::from_mode(0o755)).unwrap();

            fs::write(ctl_dir.join("query-output.json"), "[]").unwrap();

            Self {
                ctl_dir,
                script_path,
            }
        }

        /// A config pointing at the fake script, with short test timeouts
        pub fn config(&self, index_root: &Path) -> IndexerConfig {
            IndexerConfig::builder()
                .indexer_path(self.script_path.to_string_lossy().into_owned())
                .index_root(index_root)
                .build_timeout(std::time::Duration::from_secs(60))
                .query_timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap()
        }

        /// Number of `add` invocations seen so far
        pub fn add_count(&self) -> usize {
            fs::read_to_string(self.ctl_dir.join("add-count"))
                .map(|s| s.lines().count())
                .unwrap_or(0)
        }

        /// Make subsequent `add` invocations fail with exit code 1
        pub fn set_add_failure(&self, fail: bool) {
            let flag = self.ctl_dir.join("add-fail");
            if fail {
                fs::write(&flag, b"").unwrap();
            } else {
                let _ = fs::remove_file(&flag);
            }
        }

        /// Make subsequent `add` invocations sleep for `seconds` first
        pub fn set_add_delay(&self, seconds: &str) {
            fs::write(self.ctl_dir.join("add-delay"), seconds).unwrap();
        }

        /// Set the JSON printed by subsequent `query` invocations
        pub fn set_query_output(&self, json: &str) {
            fs::write(self.ctl_dir.join("query-output.json"), json).unwrap();
        }

        /// Make subsequent `query` invocations fail with `stderr` on stderr
        pub fn set_query_failure(&self, stderr: &str) {
            fs::write(self.ctl_dir.join("query-fail"), stderr).unwrap();
        }

        /// Set the JSON printed by subsequent `status` invocations
        pub fn set_status_output(&self, json: &str) {
            fs::write(self.ctl_dir.join("status-output.json"), json).unwrap();
        }

        /// The GOMAXPROCS value the last `add` invocation saw
        pub fn gomaxprocs(&self) -> Option<String> {
            fs::read_to_string(self.ctl_dir.join("gomaxprocs")).ok()
        }

        /// Every recorded invocation, oldest first, one argv line each
        pub fn invocations(&self) -> Vec<String> {
            fs::read_to_string(self.ctl_dir.join("invocations.log"))
                .map(|s| s.lines().map(str::to_string).collect())
                .unwrap_or_default()
        }
    }
}
