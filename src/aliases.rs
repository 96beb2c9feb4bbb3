use crate::ValueMap;

/// A canonical token plus the legacy spellings that mean the same field.
#[derive(Clone, Copy, Debug)]
pub struct AliasGroup {
    pub canonical: &'static str,
    pub aliases: &'static [&'static str],
}

const fn group(canonical: &'static str, aliases: &'static [&'static str]) -> AliasGroup {
    AliasGroup { canonical, aliases }
}

pub static ALIAS_TABLE: &[AliasGroup] = &[
    group("{customer.bankAccount}", &["{customer.bankacc}"]),
    group("{customer.bankCode}", &["{customer.bankcode}"]),
    group("{customer.individualCode}", &["{customer.individualcode}"]),
    group("{customer.address}", &["{customer.adress}"]),
    group("{customer.bank}", &[]),
    group("{customer.code}", &[]),
    group("{customer.company}", &[]),
    group("{customer.director}", &[]),
    group("{customer.documentName}", &[]),
    group("{customer.name}", &[]),
    group("{performer.address}", &["{performer.adress}"]),
    group("{performer.bankAccount}", &["{performer.bankacc}"]),
    group("{performer.bankCode}", &["{performer.bankcode}"]),
    group("{performer.individualCode}", &["{performer.individualcode}"]),
    group("{performer.bank}", &[]),
    group("{performer.code}", &[]),
    group("{performer.documentName}", &[]),
    group("{performer.name}", &[]),
];

/// Mirrors values across every alias group of [`ALIAS_TABLE`].
pub fn normalize_values(values: &ValueMap) -> ValueMap {
    normalize_with(values, ALIAS_TABLE)
}

/// A non-empty canonical value wins; otherwise the first non-empty alias (table order)
/// fills the canonical token and its siblings. Tokens nobody supplied stay absent.
pub fn normalize_with(values: &ValueMap, table: &[AliasGroup]) -> ValueMap {
    let mut out = values.clone();
    for group in table {
        let source = non_empty(&out, group.canonical).or_else(|| {
            group
                .aliases
                .iter()
                .find_map(|alias| non_empty(&out, alias))
        });
        let Some(value) = source else {
            continue;
        };
        for token in std::iter::once(&group.canonical).chain(group.aliases.iter()) {
            out.insert(token.to_string(), value.clone());
        }
    }
    out
}

fn non_empty(values: &ValueMap, token: &str) -> Option<String> {
    values.get(token).filter(|v| !v.is_empty()).cloned()
}
