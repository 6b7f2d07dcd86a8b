//! Fragment ordering and merging.

use std::path::PathBuf;

use super::error::AttributedError;
use super::fragment::ConfigFragment;
use crate::core::Target;

/// The raw merged configuration for one target, before preparation.
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub table: toml::Table,
    /// Directory of the shallowest fragment that evaluated successfully.
    pub base_dir: Option<PathBuf>,
    /// Path of that fragment, for attributing merged-config errors.
    pub source: Option<PathBuf>,
}

/// Merge the fragments contributing to one target.
///
/// Fragments are sorted by path depth ascending (stable, so ties keep the
/// host's enumeration order) and shallow-merged key by key: a deeper
/// fragment's value replaces a shallower one's. `output` is the one known
/// object key merged field-wise instead of replaced wholesale.
///
/// A fragment that fails to evaluate contributes nothing but one attributed
/// error; its siblings still merge. Given identical fragment content the
/// result is bit-identical regardless of input order.
pub fn assemble(
    target: Target,
    fragments: &[ConfigFragment],
) -> (MergedConfig, Vec<AttributedError>) {
    let mut ordered: Vec<&ConfigFragment> = fragments.iter().collect();
    ordered.sort_by_key(|f| f.depth());

    let env = target.env();
    let mut merged = toml::Table::new();
    let mut base_dir = None;
    let mut source = None;
    let mut errors = Vec::new();

    for fragment in ordered {
        match fragment.evaluate(env) {
            Ok(table) => {
                if base_dir.is_none() {
                    base_dir = Some(fragment.dir());
                    source = Some(fragment.path.clone());
                }
                shallow_merge(&mut merged, table);
            }
            Err(e) => {
                errors.push(AttributedError::new(&fragment.path, e.to_string()));
            }
        }
    }

    // Entry without an explicit context resolves relative to the shallowest
    // contributing fragment's directory.
    if merged.contains_key("entry")
        && !merged.contains_key("context")
        && let Some(dir) = &base_dir
    {
        merged.insert(
            "context".into(),
            toml::Value::String(dir.to_string_lossy().into_owned()),
        );
    }

    (
        MergedConfig {
            table: merged,
            base_dir,
            source,
        },
        errors,
    )
}

/// Shallow merge by top-level key: later values replace earlier ones.
/// `output` is merged field-wise when both sides are tables.
pub(super) fn shallow_merge(acc: &mut toml::Table, other: toml::Table) {
    for (key, value) in other {
        if key == "output"
            && let (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) =
                (acc.get_mut(&key), &value)
        {
            for (k, v) in incoming {
                existing.insert(k.clone(), v.clone());
            }
            continue;
        }
        acc.insert(key, value);
    }
}
