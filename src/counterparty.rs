use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::aliases::normalize_values;
use crate::entity::{entity_of, Entity};
use crate::placeholders::{field_of, scope_of};
use crate::ValueMap;

/// A saved business party that can fill customer or performer fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Counterparty {
    pub generic_name: Option<String>,
    pub signature_name: Option<String>,
    pub company: String,
    pub director: Option<String>,
    pub document_name: Option<String>,
    pub address: Option<String>,
    pub post_address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub bank_account: Option<String>,
    pub bank: Option<String>,
    pub bank_code: Option<String>,
    pub code: Option<String>,
    pub individual_code: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CounterpartyField {
    Name,
    SignatureName,
    Company,
    Director,
    DocumentName,
    Address,
    PostAddress,
    Phone,
    Email,
    BankAccount,
    Bank,
    BankCode,
    Code,
    IndividualCode,
}

impl Counterparty {
    pub fn field(&self, field: CounterpartyField) -> Option<&str> {
        let v = match field {
            CounterpartyField::Name => self.generic_name.as_deref(),
            CounterpartyField::SignatureName => self.signature_name.as_deref(),
            CounterpartyField::Company => Some(self.company.as_str()),
            CounterpartyField::Director => self.director.as_deref(),
            CounterpartyField::DocumentName => self.document_name.as_deref(),
            CounterpartyField::Address => self.address.as_deref(),
            CounterpartyField::PostAddress => self.post_address.as_deref(),
            CounterpartyField::Phone => self.phone.as_deref(),
            CounterpartyField::Email => self.email.as_deref(),
            CounterpartyField::BankAccount => self.bank_account.as_deref(),
            CounterpartyField::Bank => self.bank.as_deref(),
            CounterpartyField::BankCode => self.bank_code.as_deref(),
            CounterpartyField::Code => self.code.as_deref(),
            CounterpartyField::IndividualCode => self.individual_code.as_deref(),
        };
        v.filter(|s| !s.trim().is_empty())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.company.trim().is_empty() {
            return Err(anyhow!("counterparty company name is required"));
        }
        Ok(())
    }
}

/// Field of a token whose scope is the role namespace, by exact (lowercased) field name.
fn scoped_field(field: &str) -> Option<CounterpartyField> {
    use CounterpartyField::*;
    let f = match field.to_lowercase().as_str() {
        "company" => Company,
        "director" => Director,
        "address" | "adress" => Address,
        "postaddress" => PostAddress,
        "bank" => Bank,
        "bankaccount" | "bankacc" => BankAccount,
        "bankcode" => BankCode,
        "code" => Code,
        "individualcode" => IndividualCode,
        "documentname" | "document" => DocumentName,
        "name" | "genericname" => Name,
        "signaturename" => SignatureName,
        "phone" => Phone,
        "email" => Email,
        _ => return None,
    };
    Some(f)
}

/// Loose match for tokens outside the role namespace (e.g. `{client.bank_code}`).
fn heuristic_field(token: &str) -> Option<CounterpartyField> {
    use CounterpartyField::*;
    let t = token.to_lowercase();
    let f = if contains_any(&t, &["bankaccount", "bank_account", "bankacc"]) {
        BankAccount
    } else if contains_any(&t, &["bankcode", "bank_code"]) {
        BankCode
    } else if contains_any(&t, &["individualcode", "individual_code"]) {
        IndividualCode
    } else if contains_any(&t, &["bank"]) {
        Bank
    } else if contains_any(&t, &["code"]) {
        Code
    } else if contains_any(&t, &["document"]) {
        DocumentName
    } else if contains_any(&t, &["postaddress", "post_address"]) {
        PostAddress
    } else if contains_any(&t, &["address", "adress"]) {
        Address
    } else if contains_any(&t, &["company"]) {
        Company
    } else if contains_any(&t, &["director"]) {
        Director
    } else if contains_any(&t, &["phone"]) {
        Phone
    } else if contains_any(&t, &["email"]) {
        Email
    } else if contains_any(&t, &["signature"]) {
        SignatureName
    } else if contains_any(&t, &["name"]) {
        Name
    } else {
        return None;
    };
    Some(f)
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

pub fn field_for_token(token: &str, role: Entity) -> Option<CounterpartyField> {
    let in_namespace = scope_of(token).is_some_and(|s| s.eq_ignore_ascii_case(role.as_str()));
    if in_namespace {
        field_of(token).and_then(|f| scoped_field(&f))
    } else {
        heuristic_field(token)
    }
}

/// Fills `role` placeholders from `counterparty`, leaving every non-blank value alone.
pub fn auto_fill(
    placeholders: &[String],
    values: &ValueMap,
    counterparty: &Counterparty,
    role: Entity,
) -> anyhow::Result<ValueMap> {
    if !matches!(role, Entity::Customer | Entity::Performer) {
        return Err(anyhow!("auto-fill role must be customer or performer, got {role}"));
    }
    // A value under any spelling of the token counts.
    let supplied = normalize_values(values);
    let mut out = values.clone();
    for token in placeholders {
        if entity_of(token) != role {
            continue;
        }
        if supplied.get(token).is_some_and(|v| !v.trim().is_empty()) {
            continue;
        }
        let value = field_for_token(token, role).and_then(|f| counterparty.field(f));
        if let Some(value) = value {
            out.insert(token.clone(), value.to_string());
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acme() -> Counterparty {
        Counterparty {
            generic_name: Some("Acme".into()),
            company: "Acme LLC".into(),
            director: Some("J. Doe".into()),
            address: Some("Kyiv, Main st. 1".into()),
            bank_account: Some("UA0001".into()),
            bank: Some("PrivatBank".into()),
            bank_code: Some("305299".into()),
            code: Some("12345678".into()),
            ..Default::default()
        }
    }

    fn tokens(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn never_overwrites_existing_values() {
        let mut values = ValueMap::new();
        values.insert("{customer.company}".into(), "Existing".into());
        let cp = Counterparty {
            company: "New".into(),
            ..Default::default()
        };
        let out = auto_fill(&tokens(&["{customer.company}"]), &values, &cp, Entity::Customer).unwrap();
        assert_eq!(out["{customer.company}"], "Existing");
    }

    #[test]
    fn values_under_an_alias_spelling_are_kept() {
        let mut values = ValueMap::new();
        values.insert("{customer.bankacc}".into(), "Existing".into());
        let cp = Counterparty {
            company: "Acme".into(),
            bank_account: Some("New".into()),
            ..Default::default()
        };
        let list = tokens(&["{customer.bankAccount}", "{customer.bankacc}"]);
        let out = auto_fill(&list, &values, &cp, Entity::Customer).unwrap();
        assert_ne!(out.get("{customer.bankAccount}").map(String::as_str), Some("New"));
        assert_eq!(out["{customer.bankacc}"], "Existing");
        assert_eq!(normalize_values(&out)["{customer.bankAccount}"], "Existing");
    }

    #[test]
    fn blank_values_are_filled() {
        let mut values = ValueMap::new();
        values.insert("{customer.director}".into(), "   ".into());
        let list = tokens(&[
            "{customer.director}",
            "{customer.bankacc}",
            "{customer.adress}",
            "{customer.code}",
        ]);
        let out = auto_fill(&list, &values, &acme(), Entity::Customer).unwrap();
        assert_eq!(out["{customer.director}"], "J. Doe");
        assert_eq!(out["{customer.bankacc}"], "UA0001");
        assert_eq!(out["{customer.adress}"], "Kyiv, Main st. 1");
        assert_eq!(out["{customer.code}"], "12345678");
    }

    #[test]
    fn only_the_selected_role_is_filled() {
        let list = tokens(&["{customer.company}", "{performer.company}", "{agreement.number}"]);
        let out = auto_fill(&list, &ValueMap::new(), &acme(), Entity::Performer).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out["{performer.company}"], "Acme LLC");
    }

    #[test]
    fn keyword_tokens_use_heuristic_fields() {
        let list = tokens(&[
            "{client.bank_code}",
            "{client.bank}",
            "{buyer.companyName}",
            "{client.fullName}",
            "{client.unknownThing}",
        ]);
        let out = auto_fill(&list, &ValueMap::new(), &acme(), Entity::Customer).unwrap();
        assert_eq!(out["{client.bank_code}"], "305299");
        assert_eq!(out["{client.bank}"], "PrivatBank");
        assert_eq!(out["{buyer.companyName}"], "Acme LLC");
        assert_eq!(out["{client.fullName}"], "Acme");
        assert!(!out.contains_key("{client.unknownThing}"));
    }

    #[test]
    fn missing_record_fields_leave_values_absent() {
        let out = auto_fill(
            &tokens(&["{customer.email}"]),
            &ValueMap::new(),
            &acme(),
            Entity::Customer,
        )
        .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn other_roles_are_rejected() {
        assert!(auto_fill(&[], &ValueMap::new(), &acme(), Entity::Agreement).is_err());
    }

    #[test]
    fn deserializes_camel_case_records() {
        let cp: Counterparty =
            serde_json::from_str(r#"{"company":"Acme","bankAccount":"UA1","individualCode":"7"}"#)
                .unwrap();
        assert_eq!(cp.bank_account.as_deref(), Some("UA1"));
        assert_eq!(cp.field(CounterpartyField::IndividualCode), Some("7"));
        assert_eq!(cp.field(CounterpartyField::Phone), None);
    }
}
