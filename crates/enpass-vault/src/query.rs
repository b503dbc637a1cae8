//! Filtered, ordered queries over the joined `item`/`itemfield` view.
//!
//! [`build`] turns an [`EntryFilter`] into parameterized SQL:
//!
//! - terms inside one filter class are OR-ed, classes are AND-ed;
//! - a term containing `%` becomes a pattern match (`LIKE` when
//!   case-insensitive, `GLOB` when case-sensitive), any other term an
//!   equality test (`COLLATE NOCASE` when case-insensitive);
//! - deleted items are always excluded, trashed items are kept;
//! - order-by names are checked against a fixed allow-list and unknown names
//!   are reported back instead of failing the query.
//!
//! Filter values are always bound as parameters. The only text spliced into
//! the SQL are column names from the allow-list below.

use std::fmt;

use crate::entry::PASSWORD_KIND;

/// Marker that turns a filter term into a pattern match.
pub const WILDCARD: char = '%';

/// Columns selected for every entry, in binding order.
pub const ENTRY_COLUMNS: [&str; 16] = [
    "uuid",
    "type",
    "created_at",
    "field_updated_at",
    "title",
    "subtitle",
    "note",
    "trashed",
    "deleted",
    "category",
    "label",
    "value",
    "key",
    "last_used",
    "sensitive",
    "icon",
];

const SELECT_ENTRIES: &str = "SELECT item.uuid, itemfield.type, item.created_at, item.field_updated_at, \
     item.title, item.subtitle, item.note, item.trashed, item.deleted, item.category, \
     itemfield.label, itemfield.value, item.key, item.last_used, itemfield.sensitive, item.icon \
     FROM item INNER JOIN itemfield ON item.uuid = itemfield.item_uuid";

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// What to select from the vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFilter {
    /// Field type to select; empty selects every type.
    pub kind: String,
    pub categories: Vec<String>,
    pub titles: Vec<String>,
    /// Matched against the item subtitle.
    pub logins: Vec<String>,
    pub labels: Vec<String>,
    pub uuids: Vec<String>,
    pub case_sensitive: bool,
    /// Requested sort keys, validated against [`OrderField`].
    pub order_by: Vec<String>,
}

impl Default for EntryFilter {
    fn default() -> Self {
        Self {
            kind: PASSWORD_KIND.to_string(),
            categories: Vec::new(),
            titles: Vec::new(),
            logins: Vec::new(),
            labels: Vec::new(),
            uuids: Vec::new(),
            case_sensitive: false,
            order_by: Vec::new(),
        }
    }
}

impl EntryFilter {
    /// A filter selecting fields of `kind` with no further conditions.
    pub fn of_kind(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Order-by allow-list
// ---------------------------------------------------------------------------

/// Sort keys accepted in [`EntryFilter::order_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderField {
    Category,
    Login,
    Title,
    Uuid,
    Label,
    Created,
    Updated,
    LastUsed,
}

impl OrderField {
    pub const ALL: [OrderField; 8] = [
        Self::Category,
        Self::Login,
        Self::Title,
        Self::Uuid,
        Self::Label,
        Self::Created,
        Self::Updated,
        Self::LastUsed,
    ];

    /// Parse a user-supplied sort key. `subtitle` is accepted for `login`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "category" => Some(Self::Category),
            "login" | "subtitle" => Some(Self::Login),
            "title" => Some(Self::Title),
            "uuid" => Some(Self::Uuid),
            "label" => Some(Self::Label),
            "created" | "created_at" => Some(Self::Created),
            "updated" | "updated_at" => Some(Self::Updated),
            "last_used" => Some(Self::LastUsed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Login => "login",
            Self::Title => "title",
            Self::Uuid => "uuid",
            Self::Label => "label",
            Self::Created => "created",
            Self::Updated => "updated",
            Self::LastUsed => "last_used",
        }
    }

    /// Qualified column this key sorts on.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Category => "item.category",
            Self::Login => "item.subtitle",
            Self::Title => "item.title",
            Self::Uuid => "item.uuid",
            Self::Label => "itemfield.label",
            Self::Created => "item.created_at",
            Self::Updated => "item.field_updated_at",
            Self::LastUsed => "item.last_used",
        }
    }
}

impl fmt::Display for OrderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Query building
// ---------------------------------------------------------------------------

/// SQL text, its bound parameters and any order-by names that were dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryQuery {
    pub sql: String,
    pub params: Vec<String>,
    pub order_by: Vec<OrderField>,
    pub ignored_order_fields: Vec<String>,
}

/// Compose the query for `filter`.
pub fn build(filter: &EntryFilter) -> EntryQuery {
    let mut params = Vec::new();
    let mut conditions = vec!["item.deleted = 0".to_string()];

    if !filter.kind.is_empty() {
        conditions.push("itemfield.type = ?".to_string());
        params.push(filter.kind.clone());
    }

    let classes: [(&str, &[String]); 5] = [
        ("item.category", &filter.categories),
        ("item.title", &filter.titles),
        ("item.subtitle", &filter.logins),
        ("itemfield.label", &filter.labels),
        ("item.uuid", &filter.uuids),
    ];
    for (column, terms) in classes {
        if let Some(clause) = any_of(column, terms, filter.case_sensitive, &mut params) {
            conditions.push(clause);
        }
    }

    let (order_by, ignored_order_fields) = validate_order_by(&filter.order_by);

    let mut sql = format!("{SELECT_ENTRIES} WHERE {}", conditions.join(" AND "));
    if !order_by.is_empty() {
        let columns: Vec<&str> = order_by.iter().map(OrderField::column).collect();
        sql.push_str(" ORDER BY ");
        sql.push_str(&columns.join(", "));
    }

    tracing::trace!(sql = %sql, params = params.len(), "built entry query");
    EntryQuery {
        sql,
        params,
        order_by,
        ignored_order_fields,
    }
}

/// Split requested sort keys into accepted fields and rejected names.
pub fn validate_order_by(requested: &[String]) -> (Vec<OrderField>, Vec<String>) {
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();

    for name in requested {
        match OrderField::parse(name) {
            Some(field) if !accepted.contains(&field) => accepted.push(field),
            Some(_) => {}
            None => rejected.push(name.clone()),
        }
    }

    if !rejected.is_empty() {
        tracing::warn!(
            fields = %rejected.join(", "),
            "the following fields cannot be used for ordering"
        );
        if accepted.is_empty() {
            tracing::warn!("no valid order-by fields remain, results are unordered");
        }
    }
    (accepted, rejected)
}

/// OR together one clause per term, or `None` if there are no terms.
fn any_of(
    column: &str,
    terms: &[String],
    case_sensitive: bool,
    params: &mut Vec<String>,
) -> Option<String> {
    let clauses: Vec<String> = terms
        .iter()
        .map(|term| term_clause(column, term, case_sensitive, params))
        .collect();

    match clauses.len() {
        0 => None,
        1 => clauses.into_iter().next(),
        _ => Some(format!("({})", clauses.join(" OR "))),
    }
}

fn term_clause(column: &str, term: &str, case_sensitive: bool, params: &mut Vec<String>) -> String {
    let has_wildcard = term.contains(WILDCARD);
    match (has_wildcard, case_sensitive) {
        (true, true) => {
            params.push(glob_pattern(term));
            format!("{column} GLOB ?")
        }
        (true, false) => {
            params.push(like_pattern(term));
            format!("{column} LIKE ? ESCAPE '\\'")
        }
        (false, true) => {
            params.push(term.to_string());
            format!("{column} = ?")
        }
        (false, false) => {
            params.push(term.to_string());
            format!("{column} = ? COLLATE NOCASE")
        }
    }
}

/// `LIKE` pattern where only `%` is special.
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len());
    for c in term.chars() {
        if c == '\\' || c == '_' {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern
}

/// `GLOB` pattern with `%` mapped to `*` and glob metacharacters escaped.
fn glob_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len());
    for c in term.chars() {
        match c {
            WILDCARD => pattern.push('*'),
            '*' => pattern.push_str("[*]"),
            '?' => pattern.push_str("[?]"),
            '[' => pattern.push_str("[[]"),
            _ => pattern.push(c),
        }
    }
    pattern
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn where_clause(query: &EntryQuery) -> &str {
        query.sql.split(" WHERE ").nth(1).unwrap()
    }

    #[test]
    fn default_filter_selects_live_passwords() {
        let query = build(&EntryFilter::default());
        assert_eq!(
            where_clause(&query),
            "item.deleted = 0 AND itemfield.type = ?"
        );
        assert_eq!(query.params, vec!["password"]);
        assert!(!query.sql.contains("ORDER BY"));
    }

    #[test]
    fn empty_kind_selects_every_type() {
        let query = build(&EntryFilter::of_kind(""));
        assert_eq!(where_clause(&query), "item.deleted = 0");
        assert!(query.params.is_empty());
    }

    #[test]
    fn terms_or_within_class_and_across_classes() {
        let filter = EntryFilter {
            categories: vec!["login".into(), "finance".into()],
            titles: vec!["GitHub".into()],
            case_sensitive: true,
            ..EntryFilter::default()
        };
        let query = build(&filter);
        assert_eq!(
            where_clause(&query),
            "item.deleted = 0 AND itemfield.type = ? \
             AND (item.category = ? OR item.category = ?) AND item.title = ?"
        );
        assert_eq!(query.params, vec!["password", "login", "finance", "GitHub"]);
    }

    #[test]
    fn case_insensitive_equality_uses_nocase() {
        let filter = EntryFilter {
            logins: vec!["alice".into()],
            ..EntryFilter::default()
        };
        let query = build(&filter);
        assert!(query.sql.ends_with("item.subtitle = ? COLLATE NOCASE"));
    }

    #[test]
    fn wildcard_case_insensitive_uses_like() {
        let filter = EntryFilter {
            titles: vec!["git_%".into()],
            ..EntryFilter::default()
        };
        let query = build(&filter);
        assert!(query.sql.ends_with("item.title LIKE ? ESCAPE '\\'"));
        assert_eq!(query.params[1], "git\\_%");
    }

    #[test]
    fn wildcard_case_sensitive_uses_glob() {
        let filter = EntryFilter {
            labels: vec!["%[x]*?%".into()],
            case_sensitive: true,
            ..EntryFilter::default()
        };
        let query = build(&filter);
        assert!(query.sql.ends_with("itemfield.label GLOB ?"));
        assert_eq!(query.params[1], "*[[]x][*][?]*");
    }

    #[test]
    fn uuid_filter_is_supported() {
        let filter = EntryFilter {
            uuids: vec!["a2ec30c0-aeed-41f7-aed7-cc50e69ff506".into()],
            case_sensitive: true,
            ..EntryFilter::default()
        };
        let query = build(&filter);
        assert!(query.sql.ends_with("item.uuid = ?"));
    }

    #[test]
    fn order_by_drops_unknown_fields() {
        let filter = EntryFilter {
            order_by: vec!["title".into(), "bogus".into()],
            ..EntryFilter::default()
        };
        let query = build(&filter);
        assert!(query.sql.ends_with(" ORDER BY item.title"));
        assert_eq!(query.order_by, vec![OrderField::Title]);
        assert_eq!(query.ignored_order_fields, vec!["bogus"]);
    }

    #[test]
    fn order_by_with_no_valid_fields_is_skipped() {
        let filter = EntryFilter {
            order_by: vec!["bogus".into(), "password".into()],
            ..EntryFilter::default()
        };
        let query = build(&filter);
        assert!(!query.sql.contains("ORDER BY"));
        assert_eq!(query.ignored_order_fields, vec!["bogus", "password"]);
    }

    #[test]
    fn order_by_aliases_and_duplicates_collapse() {
        let filter = EntryFilter {
            order_by: vec!["login".into(), "subtitle".into(), "Category".into()],
            ..EntryFilter::default()
        };
        let query = build(&filter);
        assert!(query.sql.ends_with(" ORDER BY item.subtitle, item.category"));
        assert!(query.ignored_order_fields.is_empty());
    }

    #[test]
    fn every_order_field_round_trips_through_parse() {
        for field in OrderField::ALL {
            assert_eq!(OrderField::parse(field.as_str()), Some(field));
        }
    }

    #[test]
    fn selected_columns_match_binding_list() {
        let select = SELECT_ENTRIES
            .trim_start_matches("SELECT ")
            .split(" FROM ")
            .next()
            .unwrap();
        let names: Vec<&str> = select
            .split(", ")
            .map(|column| column.rsplit('.').next().unwrap())
            .collect();
        assert_eq!(names, ENTRY_COLUMNS);
    }
}
