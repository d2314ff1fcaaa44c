//! Identifier legalization and loop-bound resolution.

use std::collections::{BTreeMap, HashSet};

use crate::kir::Expr;
use crate::reduction::Bound;

/// Words the kernel language reserves.
const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "break", "class", "continue", "def", "del",
    "elif", "else", "except", "finally", "for", "from", "global", "if", "import", "in", "is",
    "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try", "while", "with", "yield",
];

/// Names the synthesizers generate themselves.
const GENERATED: &[&str] = &[
    "range", "dpex", "dpnp", "j", "stride0", "local_id0", "local_id1", "local_id2",
    "local_size0", "local_size1", "local_size2", "group_id0", "group_id1", "group_id2",
];

/// Prefix of the per-variable local buffers.
pub const LOCAL_SUMS_PREFIX: &str = "local_sums_";

/// True if the synthesizers assign or call `name` themselves, so a
/// caller-supplied name must not use it.
pub fn is_generated(name: &str) -> bool {
    GENERATED.contains(&name) || name.starts_with(LOCAL_SUMS_PREFIX)
}

/// True if `name` can be used verbatim as an identifier in kernel text.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !KEYWORDS.contains(&name)
}

/// One-to-one mapping from raw reduction-variable names to text-safe
/// identifiers.
///
/// The result depends only on the ordered raw names and the reserved
/// sentinel name, so separately built kernels agree on every name.
#[derive(Clone, Debug, Default)]
pub struct LegalNames {
    entries: Vec<(String, String)>,
}

impl LegalNames {
    pub fn new<'a>(raw: impl IntoIterator<Item = &'a str>, sentinel: &str) -> Self {
        let mut taken: HashSet<String> = HashSet::new();
        taken.insert(sentinel.to_string());
        let mut entries: Vec<(String, String)> = Vec::new();

        for name in raw {
            if entries.iter().any(|(r, _)| r == name) {
                continue;
            }
            let base = sanitize(name);
            let mut legal = base.clone();
            let mut n = 1;
            while taken.contains(&legal) {
                legal = format!("{}_{}", base, n);
                n += 1;
            }
            taken.insert(legal.clone());
            entries.push((name.to_string(), legal));
        }

        Self { entries }
    }

    pub fn get(&self, raw: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(r, _)| r == raw)
            .map(|(_, legal)| legal.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(r, l)| (r.as_str(), l.as_str()))
    }
}

fn sanitize(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    if out.starts_with(LOCAL_SUMS_PREFIX) {
        out.insert(0, '_');
    }
    if KEYWORDS.contains(&out.as_str()) || GENERATED.contains(&out.as_str()) {
        out.push('_');
    }
    out
}

/// Resolve a loop bound to an expression. Symbols are looked up in the
/// parameter substitution table; unmapped symbols are kept by name.
pub fn resolve_bound(bound: &Bound, subst: &BTreeMap<String, String>) -> Expr {
    match bound {
        Bound::Literal(v) => Expr::int(*v),
        Bound::Symbol(sym) => match subst.get(sym) {
            Some(param) => Expr::var(param.clone()),
            None => {
                tracing::warn!(symbol = %sym, "loop bound symbol has no parameter binding");
                Expr::var(sym.clone())
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("sum"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("1x"));
        assert!(!is_identifier("a.b"));
        assert!(!is_identifier("while"));
        assert!(!is_identifier("naïve"));
    }

    #[test]
    fn test_sanitize_raw_names() {
        let names = LegalNames::new(["$sum.1", "2acc", "s", "for"], "__sentinel__");
        assert_eq!(names.get("$sum.1"), Some("_sum_1"));
        assert_eq!(names.get("2acc"), Some("_2acc"));
        assert_eq!(names.get("s"), Some("s"));
        assert_eq!(names.get("for"), Some("for_"));
        assert_eq!(names.get("missing"), None);
        assert_eq!(names.len(), 4);
    }

    #[test]
    fn test_generated_names_are_avoided() {
        let names = LegalNames::new(
            ["j", "stride0", "local_sums_x", "__sentinel__"],
            "__sentinel__",
        );
        assert_eq!(names.get("j"), Some("j_"));
        assert_eq!(names.get("stride0"), Some("stride0_"));
        assert_eq!(names.get("local_sums_x"), Some("_local_sums_x"));
        assert_eq!(names.get("__sentinel__"), Some("__sentinel___1"));
    }

    #[test]
    fn test_is_generated() {
        assert!(is_generated("j"));
        assert!(is_generated("group_id2"));
        assert!(is_generated("local_sums_acc"));
        assert!(!is_generated("i"));
        assert!(!is_generated("local_size3"));
    }

    #[test]
    fn test_collisions_are_disambiguated() {
        let names = LegalNames::new(["a.b", "a$b", "a_b"], "__sentinel__");
        let legal: Vec<&str> = names.iter().map(|(_, l)| l).collect();
        assert_eq!(legal, vec!["a_b", "a_b_1", "a_b_2"]);
    }

    #[test]
    fn test_mapping_is_deterministic() {
        let raw = ["x.1", "x_1", "y"];
        let a = LegalNames::new(raw, "mark");
        let b = LegalNames::new(raw, "mark");
        assert_eq!(a.iter().collect::<Vec<_>>(), b.iter().collect::<Vec<_>>());
    }

    #[test]
    fn test_duplicate_raw_names_map_once() {
        let names = LegalNames::new(["s", "s"], "__sentinel__");
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn test_resolve_bound() {
        let mut subst = BTreeMap::new();
        subst.insert("n".to_string(), "arg_n".to_string());
        assert_eq!(resolve_bound(&Bound::Literal(7), &subst), Expr::int(7));
        assert_eq!(resolve_bound(&Bound::from("n"), &subst), Expr::var("arg_n"));
        assert_eq!(resolve_bound(&Bound::from("m"), &subst), Expr::var("m"));
    }
}
