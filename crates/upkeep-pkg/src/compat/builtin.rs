//! Built-in compatibility filters
//!
//! Known, stable incompatibilities between asdf plugins and the rest of a
//! developer machine.

use super::filter::{CompatibilityFilter, PostAction};

pub(crate) fn builtin_filters() -> Vec<CompatibilityFilter> {
    vec![
        CompatibilityFilter::new("asdf", "nodejs")
            .requires("corepack")
            .with_warning(
                "corepack is available: yarn/pnpm shims are provided by corepack, not by asdf",
            )
            .with_env("COREPACK_ENABLE_DOWNLOAD_PROMPT", "0")
            .with_post(PostAction::new(&["corepack", "enable"], "enable corepack").ignoring_errors()),
        CompatibilityFilter::new("asdf", "nodejs")
            .conflict()
            .requires("volta")
            .with_warning("volta also manages node on this PATH; asdf shims may be shadowed"),
        CompatibilityFilter::new("asdf", "python")
            .when_env_contains("CONDA_PREFIX", "conda")
            .with_warning("an active conda environment shadows asdf python shims"),
        CompatibilityFilter::new("asdf", "ruby")
            .on_os(&["macos"])
            .on_arch(&["aarch64"])
            .with_env(
                "RUBY_CONFIGURE_OPTS",
                "--with-openssl-dir=/opt/homebrew/opt/openssl@3",
            )
            .with_warning("building ruby against Homebrew openssl@3"),
        CompatibilityFilter::new("asdf", "golang").with_env("GOTOOLCHAIN", "local"),
    ]
}
