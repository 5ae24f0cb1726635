//! Dataset profiles: per-column coercions, required columns and derived fields

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::types::{DatasetKind, Fields};

/// How a column's cells are coerced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Trimmed text, native numbers and booleans kept
    Auto,
    /// Always a string; integral numbers lose the trailing `.0`
    Text,
    Integer,
    /// `YYYY-MM-DD HH:MM:SS`
    DateTime,
    /// Digits only, at least 8 of them
    Phone,
    /// Canonical `SIGLA -SC` base name
    Hub,
}

/// Rule for one named column
#[derive(Debug, Clone, Copy)]
pub struct ColumnRule {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub required: bool,
}

const fn rule(name: &'static str, kind: ColumnKind, required: bool) -> ColumnRule {
    ColumnRule { name, kind, required }
}

const ORDER_NUMBER: &str = "Número de pedido JMS";

const TELEFONES_RULES: &[ColumnRule] = &[
    rule("Motorista", ColumnKind::Text, true),
    rule("Contato", ColumnKind::Phone, false),
    rule("Telefone", ColumnKind::Phone, false),
    rule("HUB", ColumnKind::Hub, false),
    rule("Data", ColumnKind::DateTime, false),
];

const RETIDOS_RULES: &[ColumnRule] = &[
    rule(ORDER_NUMBER, ColumnKind::Text, true),
    rule("Unidade responsável", ColumnKind::Text, false),
    rule("BASE", ColumnKind::Hub, false),
];

const SLA_RULES: &[ColumnRule] = &[
    rule(ORDER_NUMBER, ColumnKind::Text, true),
    rule("Base de entrega", ColumnKind::Hub, false),
    rule("Horário de saída para entrega", ColumnKind::DateTime, false),
];

/// Normalization profile of a dataset kind
#[derive(Debug, Clone, Copy)]
pub struct DatasetProfile {
    kind: DatasetKind,
    rules: &'static [ColumnRule],
}

impl DatasetProfile {
    pub fn for_kind(kind: DatasetKind) -> Self {
        let rules = match kind {
            DatasetKind::Generic => &[][..],
            DatasetKind::Telefones => TELEFONES_RULES,
            DatasetKind::Retidos => RETIDOS_RULES,
            DatasetKind::Sla => SLA_RULES,
        };
        Self { kind, rules }
    }

    /// Rule for a header, matched case-insensitively after trimming
    pub fn rule_for(&self, header: &str) -> Option<&ColumnRule> {
        let wanted = header.trim().to_lowercase();
        self.rules.iter().find(|r| r.name.to_lowercase() == wanted)
    }

    pub fn required_columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().filter(|r| r.required).map(|r| r.name)
    }

    /// Base names carried by an accepted row, from its hub columns
    pub fn bases<'a>(&'a self, fields: &'a Fields) -> impl Iterator<Item = &'a str> + 'a {
        self.rules
            .iter()
            .filter(|r| r.kind == ColumnKind::Hub)
            .filter_map(move |r| lookup(fields, r.name))
            .filter_map(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Add derived and system columns to an accepted row
    pub fn finish_record(&self, fields: &mut Fields) {
        if self.kind != DatasetKind::Retidos {
            return;
        }

        let base_missing = lookup(fields, "BASE").map_or(true, Value::is_null);
        if base_missing {
            let unit = lookup(fields, "Unidade responsável")
                .and_then(Value::as_str)
                .map(normalize_hub);
            if let Some(unit) = unit {
                let key = existing_key(fields, "BASE").unwrap_or_else(|| "BASE".to_string());
                fields.insert(key, Value::String(unit));
            }
        }

        if lookup(fields, "TELEFONE_MOTORISTA").is_none() {
            fields.insert("TELEFONE_MOTORISTA".into(), Value::String(String::new()));
        }
        if lookup(fields, "STATUS_PROCESSAMENTO").is_none() {
            fields.insert("STATUS_PROCESSAMENTO".into(), Value::String("PENDENTE".into()));
        }
    }
}

fn existing_key(fields: &Fields, name: &str) -> Option<String> {
    let wanted = name.to_lowercase();
    fields.keys().find(|k| k.to_lowercase() == wanted).cloned()
}

fn lookup<'a>(fields: &'a Fields, name: &str) -> Option<&'a Value> {
    existing_key(fields, name).and_then(|k| fields.get(&k))
}

static CD_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^CD\s+([A-Z]{2,4})\s+\d+").unwrap());
static GLUED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Z]{2,4})-SC$").unwrap());
static SPACE_AFTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Z]{2,4})-\s+SC$").unwrap());
static SPACED_DASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+-\s+").unwrap());
static SPACE_BEFORE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Z]{2,4})\s+-SC$").unwrap());

/// Canonical hub name: `SIGLA -SC`
///
/// `CD BNU 001`, `BNU-SC`, `BNU- SC`, `BNU - SC` and `BNU  -SC` all become
/// `BNU -SC`. Unrecognized names are upper-cased and trimmed.
pub fn normalize_hub(value: &str) -> String {
    let hub = value.trim().to_uppercase();

    for pattern in [&*CD_CODE, &*GLUED, &*SPACE_AFTER] {
        if let Some(caps) = pattern.captures(&hub) {
            return format!("{} -SC", &caps[1]);
        }
    }

    if SPACED_DASH.is_match(&hub) {
        return SPACED_DASH.replace_all(&hub, " -").into_owned();
    }

    if let Some(caps) = SPACE_BEFORE.captures(&hub) {
        return format!("{} -SC", &caps[1]);
    }

    hub
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_hub() {
        assert_eq!(normalize_hub("CD BNU 001"), "BNU -SC");
        assert_eq!(normalize_hub("bnu-sc"), "BNU -SC");
        assert_eq!(normalize_hub("ITJ- SC"), "ITJ -SC");
        assert_eq!(normalize_hub("BNU - SC"), "BNU -SC");
        assert_eq!(normalize_hub("BNU   -SC"), "BNU -SC");
        assert_eq!(normalize_hub(" BNU -SC "), "BNU -SC");
        assert_eq!(normalize_hub("Joinville"), "JOINVILLE");
    }

    #[test]
    fn test_rule_lookup_ignores_case() {
        let profile = DatasetProfile::for_kind(DatasetKind::Sla);
        let rule = profile.rule_for("  número DE PEDIDO jms ").unwrap();
        assert!(rule.required);
        assert_eq!(rule.kind, ColumnKind::Text);
    }

    #[test]
    fn test_generic_has_no_requirements() {
        let profile = DatasetProfile::for_kind(DatasetKind::Generic);
        assert_eq!(profile.required_columns().count(), 0);
        assert!(profile.rule_for("Motorista").is_none());
    }

    #[test]
    fn test_bases_from_hub_columns() {
        let profile = DatasetProfile::for_kind(DatasetKind::Sla);
        let mut fields = Fields::new();
        fields.insert(ORDER_NUMBER.into(), Value::from("JMS1"));
        fields.insert("base de entrega".into(), Value::from("ITJ -SC"));
        assert_eq!(profile.bases(&fields).collect::<Vec<_>>(), vec!["ITJ -SC"]);

        fields.insert("base de entrega".into(), Value::Null);
        assert_eq!(profile.bases(&fields).count(), 0);

        let generic = DatasetProfile::for_kind(DatasetKind::Generic);
        assert_eq!(generic.bases(&fields).count(), 0);
    }

    #[test]
    fn test_retidos_derived_columns() {
        let profile = DatasetProfile::for_kind(DatasetKind::Retidos);
        let mut fields = Fields::new();
        fields.insert(ORDER_NUMBER.into(), Value::from("JMS123"));
        fields.insert("Unidade responsável".into(), Value::from("CD BNU 001"));

        profile.finish_record(&mut fields);

        assert_eq!(fields["BASE"], Value::from("BNU -SC"));
        assert_eq!(fields["STATUS_PROCESSAMENTO"], Value::from("PENDENTE"));
        assert_eq!(fields["TELEFONE_MOTORISTA"], Value::from(""));
    }

    #[test]
    fn test_retidos_keeps_existing_base() {
        let profile = DatasetProfile::for_kind(DatasetKind::Retidos);
        let mut fields = Fields::new();
        fields.insert("Base".into(), Value::from("ITJ -SC"));
        fields.insert("Unidade responsável".into(), Value::from("CD BNU 001"));

        profile.finish_record(&mut fields);

        assert_eq!(fields["Base"], Value::from("ITJ -SC"));
        assert!(fields.get("BASE").is_none());
    }
}
