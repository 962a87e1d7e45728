// 🧾 StatementRecord - the resolved output of one document
//
// Built once per document, handed whole to reconciliation, then dropped.
// Instruments are a closed set: an account always carries an account
// snapshot and account transactions, a card always carries card ones.

use crate::error::RejectedRow;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

// ============================================================================
// PARTIES
// ============================================================================

/// Issuing bank. Natural key: (full_name, abbreviation).
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Institution {
    pub full_name: Option<String>,
    pub abbreviation: String,
    pub address: Option<String>,
    pub company_registration_number: Option<String>,
    pub gst_registration_number: Option<String>,
    pub website: Option<String>,
    pub email: Option<String>,
}

impl Institution {
    pub fn new(abbreviation: impl Into<String>) -> Self {
        Institution {
            abbreviation: abbreviation.into(),
            ..Institution::default()
        }
    }

    pub fn with_full_name(mut self, full_name: impl Into<String>) -> Self {
        self.full_name = Some(full_name.into());
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_registration(mut self, company: impl Into<String>, gst: impl Into<String>) -> Self {
        self.company_registration_number = Some(company.into());
        self.gst_registration_number = Some(gst.into());
        self
    }

    pub fn with_website(mut self, website: impl Into<String>) -> Self {
        self.website = Some(website.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Statement holder. Natural key: (full_name, address).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Holder {
    pub full_name: String,
    pub address: Option<String>,
}

// ============================================================================
// INSTRUMENTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatementKind {
    Account,
    Card,
}

impl StatementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatementKind::Account => "ACCOUNT",
            StatementKind::Card => "CARD",
        }
    }
}

/// Natural key: (holder, provider, name, number, currency, account_type).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    pub name: String,
    pub number: String,
    pub currency: Option<String>,
    pub account_type: Option<String>,
}

/// Natural key: (holder, provider, name, number, currency).
/// `name_on_card` and `parent_number` are stored on first sight only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Card {
    pub name: String,
    pub number: String,
    pub currency: Option<String>,
    pub name_on_card: Option<String>,
    /// Primary card of a supplementary card.
    pub parent_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AccountSnapshot {
    pub balance: Option<Decimal>,
    pub credit_line: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CardSnapshot {
    pub total_credit_limit: Option<Decimal>,
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

/// Withdrawals are the transaction amount.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AccountTransaction {
    pub date: Option<NaiveDate>,
    pub description: String,
    pub sub_description: Vec<String>,
    pub amount: Option<Decimal>,
    pub deposits: Option<Decimal>,
    pub balance: Option<Decimal>,
}

/// `date` is the transaction date; a " CR" amount lands in `cash_rebate`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CardTransaction {
    pub date: Option<NaiveDate>,
    pub post_date: Option<NaiveDate>,
    pub description: String,
    pub sub_description: Vec<String>,
    pub amount: Option<Decimal>,
    pub cash_rebate: Option<Decimal>,
}

/// One instrument as seen on this statement. Transactions are in document
/// order; their row numbers are their positions, starting at 1.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstrumentSnapshot {
    Account {
        account: Account,
        snapshot: AccountSnapshot,
        transactions: Vec<AccountTransaction>,
    },
    Card {
        card: Card,
        snapshot: CardSnapshot,
        transactions: Vec<CardTransaction>,
    },
}

impl InstrumentSnapshot {
    pub fn account(account: Account, snapshot: AccountSnapshot) -> Self {
        InstrumentSnapshot::Account {
            account,
            snapshot,
            transactions: Vec::new(),
        }
    }

    pub fn card(card: Card, snapshot: CardSnapshot) -> Self {
        InstrumentSnapshot::Card {
            card,
            snapshot,
            transactions: Vec::new(),
        }
    }

    pub fn number(&self) -> &str {
        match self {
            InstrumentSnapshot::Account { account, .. } => &account.number,
            InstrumentSnapshot::Card { card, .. } => &card.number,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            InstrumentSnapshot::Account { account, .. } => &account.name,
            InstrumentSnapshot::Card { card, .. } => &card.name,
        }
    }

    pub fn transaction_count(&self) -> usize {
        match self {
            InstrumentSnapshot::Account { transactions, .. } => transactions.len(),
            InstrumentSnapshot::Card { transactions, .. } => transactions.len(),
        }
    }
}

// ============================================================================
// STATEMENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementRecord {
    pub file_name: String,
    pub institution: Institution,
    pub holder: Holder,
    pub date: NaiveDate,
    pub kind: StatementKind,
    pub instruments: Vec<InstrumentSnapshot>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejected_rows: Vec<RejectedRow>,
}

impl StatementRecord {
    pub fn instrument(&self, number: &str) -> Option<&InstrumentSnapshot> {
        self.instruments.iter().find(|i| i.number() == number)
    }

    pub fn transaction_count(&self) -> usize {
        self.instruments.iter().map(InstrumentSnapshot::transaction_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> StatementRecord {
        let mut savings = InstrumentSnapshot::account(
            Account {
                name: "360 Account".to_string(),
                number: "601234567001".to_string(),
                currency: None,
                account_type: None,
            },
            AccountSnapshot::default(),
        );
        if let InstrumentSnapshot::Account { transactions, .. } = &mut savings {
            transactions.push(AccountTransaction {
                description: "BALANCE B/F".to_string(),
                ..AccountTransaction::default()
            });
        }

        StatementRecord {
            file_name: "ocbc_0324".to_string(),
            institution: Institution::new("OCBC").with_full_name("Oversea-Chinese Banking Corporation"),
            holder: Holder {
                full_name: "John Tan".to_string(),
                address: None,
            },
            date: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            kind: StatementKind::Account,
            instruments: vec![savings],
            rejected_rows: Vec::new(),
        }
    }

    #[test]
    fn test_instrument_lookup_by_number() {
        let record = record();
        assert_eq!(record.instrument("601234567001").unwrap().name(), "360 Account");
        assert!(record.instrument("000").is_none());
        assert_eq!(record.transaction_count(), 1);
    }

    #[test]
    fn test_record_serializes_tagged_instruments() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["kind"], "ACCOUNT");
        assert_eq!(json["instruments"][0]["kind"], "account");
        assert_eq!(json["instruments"][0]["account"]["number"], "601234567001");
        assert!(json.get("rejected_rows").is_none());
    }
}
