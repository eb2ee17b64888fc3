//! Language preference lookup for the `accept-language` parameter.

use std::env;
use std::fmt::Debug;

/// Source of the preferred response language, if any.
pub trait LocaleSource: Send + Sync + Debug {
    fn language(&self) -> Option<String>;
}

/// Reads the POSIX locale environment (`LANGUAGE`, `LC_ALL`, `LC_MESSAGES`, `LANG`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLocale;

const LOCALE_VARS: &[&str] = &["LANGUAGE", "LC_ALL", "LC_MESSAGES", "LANG"];

impl LocaleSource for SystemLocale {
    fn language(&self) -> Option<String> {
        LOCALE_VARS
            .iter()
            .filter_map(|var| env::var(var).ok())
            .find(|value| !value.is_empty())
            .and_then(|value| language_tag(&value))
    }
}

/// Always answers with the same value. `None` disables the lookup.
#[derive(Debug, Clone, Default)]
pub struct FixedLocale(pub Option<String>);

impl LocaleSource for FixedLocale {
    fn language(&self) -> Option<String> {
        self.0.clone().filter(|tag| !tag.is_empty())
    }
}

/// Turn a locale name such as `en_GB.UTF-8@euro` into `en-gb`.
///
/// `LANGUAGE` may hold a colon-separated list; only the first entry counts.
/// `C` and `POSIX` carry no language.
pub fn language_tag(locale: &str) -> Option<String> {
    let first = locale.split(':').next()?;
    let name = first
        .split(['.', '@'])
        .next()
        .unwrap_or_default()
        .trim();

    if name.is_empty() || name == "C" || name == "POSIX" {
        return None;
    }

    Some(name.replace('_', "-").to_lowercase())
}
