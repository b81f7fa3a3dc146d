use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::PaginationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingKind {
    Posts,
    FollowFeed,
    Comments,
    Topics,
}

impl ListingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingKind::Posts => "posts",
            ListingKind::FollowFeed => "follow_feed",
            ListingKind::Comments => "comments",
            ListingKind::Topics => "topics",
        }
    }
}

impl fmt::Display for ListingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    #[default]
    Hot,
    New,
    Alpha,
}

impl SortMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hot" | "popular" => Some(SortMode::Hot),
            "new" => Some(SortMode::New),
            "alpha" => Some(SortMode::Alpha),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortMode::Hot => "hot",
            SortMode::New => "new",
            SortMode::Alpha => "alpha",
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    Bool,
    Int,
    Timestamp,
    Text,
}

/// Columns a listing can be ordered by.
///
/// Executors must expose every field under [`SortField::column`] so that the
/// rendered `ORDER BY` and seek fragment can reference it by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SortField {
    /// Group membership for the two-source feed merge.
    IsFollowing,
    /// Sum of votes (posts, comments) or follower count (topics).
    Score,
    /// Comment count (posts), reply count (comments) or post count (topics).
    SecondaryCount,
    CreatedDate,
    Title,
    Id,
}

impl SortField {
    pub const fn column(self) -> &'static str {
        match self {
            SortField::IsFollowing => "is_following",
            SortField::Score => "score",
            SortField::SecondaryCount => "secondary_count",
            SortField::CreatedDate => "created_date",
            SortField::Title => "title",
            SortField::Id => "id",
        }
    }

    pub const fn value_type(self) -> ValueType {
        match self {
            SortField::IsFollowing => ValueType::Bool,
            SortField::Score | SortField::SecondaryCount | SortField::Id => ValueType::Int,
            SortField::CreatedDate => ValueType::Timestamp,
            SortField::Title => ValueType::Text,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    /// Orients a natural-order comparison so that `Less` means "earlier in the listing".
    pub fn orient(self, natural: Ordering) -> Ordering {
        match self {
            SortDirection::Asc => natural,
            SortDirection::Desc => natural.reverse(),
        }
    }
}

/// How an absent value is treated before it takes part in ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NullPolicy {
    Required,
    ZeroIfAbsent,
}

impl NullPolicy {
    pub fn resolve(
        self,
        field: SortField,
        value: Option<FieldValue>,
    ) -> Result<FieldValue, PaginationError> {
        match (self, value) {
            (_, Some(value)) => Ok(value),
            (NullPolicy::ZeroIfAbsent, None) => Ok(FieldValue::zero_of(field.value_type())),
            (NullPolicy::Required, None) => Err(PaginationError::MissingSortValue(field)),
        }
    }

    /// Renders the SurrealQL projection of `expr` under `alias`.
    ///
    /// Listing queries project every sort field through this so the ordering and
    /// the seek fragment compare the same coalesced column.
    pub fn project(self, expr: &str, alias: &str) -> String {
        match self {
            NullPolicy::Required => format!("{expr} AS {alias}"),
            NullPolicy::ZeroIfAbsent => format!("({expr} ?? 0) AS {alias}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SortKey {
    pub field: SortField,
    pub direction: SortDirection,
    pub null_policy: NullPolicy,
}

const fn required(field: SortField, direction: SortDirection) -> SortKey {
    SortKey {
        field,
        direction,
        null_policy: NullPolicy::Required,
    }
}

const fn aggregate(field: SortField) -> SortKey {
    SortKey {
        field,
        direction: SortDirection::Desc,
        null_policy: NullPolicy::ZeroIfAbsent,
    }
}

use SortDirection::{Asc, Desc};
use SortField::{CreatedDate, Id, IsFollowing, Score, SecondaryCount, Title};

const HOT_KEYS: &[SortKey] = &[
    aggregate(Score),
    aggregate(SecondaryCount),
    required(CreatedDate, Desc),
    required(Id, Desc),
];

const NEW_KEYS: &[SortKey] = &[
    required(CreatedDate, Desc),
    aggregate(Score),
    aggregate(SecondaryCount),
    required(Id, Desc),
];

const ALPHA_KEYS: &[SortKey] = &[
    required(Title, Asc),
    required(CreatedDate, Desc),
    required(Id, Desc),
];

const FOLLOW_HOT_KEYS: &[SortKey] = &[
    required(IsFollowing, Desc),
    aggregate(Score),
    aggregate(SecondaryCount),
    required(CreatedDate, Desc),
    required(Id, Desc),
];

const FOLLOW_NEW_KEYS: &[SortKey] = &[
    required(IsFollowing, Desc),
    required(CreatedDate, Desc),
    aggregate(Score),
    aggregate(SecondaryCount),
    required(Id, Desc),
];

const FOLLOW_ALPHA_KEYS: &[SortKey] = &[
    required(IsFollowing, Desc),
    required(Title, Asc),
    required(CreatedDate, Desc),
    required(Id, Desc),
];

/// Ordered sort keys defining the total order of one `(listing, mode)` pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SortKeyTuple {
    kind: ListingKind,
    mode: SortMode,
    keys: &'static [SortKey],
}

impl SortKeyTuple {
    pub fn kind(&self) -> ListingKind {
        self.kind
    }

    pub fn mode(&self) -> SortMode {
        self.mode
    }

    pub fn keys(&self) -> &'static [SortKey] {
        self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Identifies the tuple shape inside cursor tokens.
    pub fn shape_tag(&self) -> String {
        format!("{}.{}", self.kind, self.mode)
    }

    pub fn values_of<R>(&self, row: &R) -> Result<FieldValues, PaginationError>
    where
        R: SortKeyed + ?Sized,
    {
        let mut values = Vec::with_capacity(self.keys.len());
        for key in self.keys {
            let value = key.null_policy.resolve(key.field, row.sort_value(key.field))?;
            if value.value_type() != key.field.value_type() {
                return Err(PaginationError::InvalidSortValue(key.field));
            }
            values.push(value);
        }
        Ok(FieldValues::new(values))
    }

    /// Listing order of two value sets already shaped for this tuple.
    pub fn compare(&self, left: &FieldValues, right: &FieldValues) -> Ordering {
        self.keys
            .iter()
            .zip(left.iter().zip(right.iter()))
            .map(|(key, (left, right))| key.direction.orient(left.cmp(right)))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    /// Checks arity and value types, naming the first offending field.
    pub fn check_shape(&self, values: &FieldValues) -> Result<(), String> {
        if values.len() != self.keys.len() {
            return Err(format!(
                "expected {} sort values for {}, got {}",
                self.keys.len(),
                self.shape_tag(),
                values.len()
            ));
        }
        for (key, value) in self.keys.iter().zip(values.iter()) {
            if value.value_type() != key.field.value_type() {
                return Err(format!(
                    "sort value for '{}' has the wrong type",
                    key.field.column()
                ));
            }
        }
        Ok(())
    }
}

pub fn tuple_for(kind: ListingKind, mode: SortMode) -> Result<SortKeyTuple, PaginationError> {
    let keys = match (kind, mode) {
        (ListingKind::Posts | ListingKind::Topics | ListingKind::Comments, SortMode::Hot) => {
            HOT_KEYS
        }
        (ListingKind::Posts | ListingKind::Topics | ListingKind::Comments, SortMode::New) => {
            NEW_KEYS
        }
        (ListingKind::Posts | ListingKind::Topics, SortMode::Alpha) => ALPHA_KEYS,
        (ListingKind::FollowFeed, SortMode::Hot) => FOLLOW_HOT_KEYS,
        (ListingKind::FollowFeed, SortMode::New) => FOLLOW_NEW_KEYS,
        (ListingKind::FollowFeed, SortMode::Alpha) => FOLLOW_ALPHA_KEYS,
        (ListingKind::Comments, SortMode::Alpha) => {
            return Err(PaginationError::UnsupportedSortMode {
                kind,
                mode: mode.as_str().to_string(),
            });
        }
    };
    Ok(SortKeyTuple { kind, mode, keys })
}

/// Resolves a wire-level sort mode name; an absent name selects [`SortMode::Hot`].
pub fn tuple_for_name(
    kind: ListingKind,
    mode: Option<&str>,
) -> Result<SortKeyTuple, PaginationError> {
    let mode = match mode.map(str::trim).filter(|value| !value.is_empty()) {
        None => SortMode::default(),
        Some(raw) => SortMode::parse(raw).ok_or_else(|| PaginationError::UnsupportedSortMode {
            kind,
            mode: raw.to_string(),
        })?,
    };
    tuple_for(kind, mode)
}

/// A single sort value. Values of one variant order naturally; tuples never
/// mix variants at a given position.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    /// Milliseconds since the Unix epoch.
    Timestamp(i64),
    Text(String),
}

impl FieldValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            FieldValue::Bool(_) => ValueType::Bool,
            FieldValue::Int(_) => ValueType::Int,
            FieldValue::Timestamp(_) => ValueType::Timestamp,
            FieldValue::Text(_) => ValueType::Text,
        }
    }

    pub fn zero_of(value_type: ValueType) -> Self {
        match value_type {
            ValueType::Bool => FieldValue::Bool(false),
            ValueType::Int => FieldValue::Int(0),
            ValueType::Timestamp => FieldValue::Timestamp(0),
            ValueType::Text => FieldValue::Text(String::new()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Bool(value) => serde_json::Value::Bool(*value),
            FieldValue::Int(value) | FieldValue::Timestamp(value) => {
                serde_json::Value::from(*value)
            }
            FieldValue::Text(value) => serde_json::Value::String(value.clone()),
        }
    }

    pub fn from_json(value_type: ValueType, value: &serde_json::Value) -> Option<Self> {
        match value_type {
            ValueType::Bool => value.as_bool().map(FieldValue::Bool),
            ValueType::Int => value.as_i64().map(FieldValue::Int),
            ValueType::Timestamp => value.as_i64().map(FieldValue::Timestamp),
            ValueType::Text => value.as_str().map(|raw| FieldValue::Text(raw.to_string())),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

/// Sort values of one row, positionally aligned with a [`SortKeyTuple`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct FieldValues(Vec<FieldValue>);

impl FieldValues {
    pub fn new(values: Vec<FieldValue>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FieldValue> {
        self.0.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldValue> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Vec<FieldValue> {
        self.0
    }
}

impl From<Vec<FieldValue>> for FieldValues {
    fn from(values: Vec<FieldValue>) -> Self {
        Self(values)
    }
}

/// Rows that can report their own sort values.
///
/// Return `None` for an absent (NULL) value; the tuple's [`NullPolicy`] decides
/// whether that is zero or an error.
pub trait SortKeyed {
    fn sort_value(&self, field: SortField) -> Option<FieldValue>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Row {
        score: Option<i64>,
        count: Option<i64>,
        created: i64,
        id: i64,
    }

    impl SortKeyed for Row {
        fn sort_value(&self, field: SortField) -> Option<FieldValue> {
            match field {
                SortField::Score => self.score.map(FieldValue::Int),
                SortField::SecondaryCount => self.count.map(FieldValue::Int),
                SortField::CreatedDate => Some(FieldValue::Timestamp(self.created)),
                SortField::Id => Some(FieldValue::Int(self.id)),
                SortField::IsFollowing | SortField::Title => None,
            }
        }
    }

    #[test]
    fn every_supported_tuple_ends_with_the_unique_id() {
        let kinds = [
            ListingKind::Posts,
            ListingKind::FollowFeed,
            ListingKind::Comments,
            ListingKind::Topics,
        ];
        let modes = [SortMode::Hot, SortMode::New, SortMode::Alpha];
        for kind in kinds {
            for mode in modes {
                let Ok(tuple) = tuple_for(kind, mode) else {
                    continue;
                };
                let last = tuple.keys().last().expect("non-empty tuple");
                assert_eq!(last.field, SortField::Id, "{}", tuple.shape_tag());
                assert_eq!(last.direction, SortDirection::Desc);
            }
        }
    }

    #[test]
    fn comments_do_not_support_alphabetical_order() {
        let err = tuple_for(ListingKind::Comments, SortMode::Alpha).expect_err("unsupported");
        assert_eq!(
            err,
            PaginationError::UnsupportedSortMode {
                kind: ListingKind::Comments,
                mode: "alpha".into(),
            }
        );
    }

    #[test]
    fn follow_feed_leads_with_group_membership() {
        for mode in [SortMode::Hot, SortMode::New, SortMode::Alpha] {
            let tuple = tuple_for(ListingKind::FollowFeed, mode).expect("tuple");
            assert_eq!(tuple.keys()[0].field, SortField::IsFollowing);
            assert_eq!(tuple.keys()[0].direction, SortDirection::Desc);
            let plain = tuple_for(ListingKind::Posts, mode).expect("posts tuple");
            assert_eq!(&tuple.keys()[1..], plain.keys());
        }
    }

    #[test]
    fn hot_tuple_matches_popularity_order() {
        let tuple = tuple_for(ListingKind::Posts, SortMode::Hot).expect("tuple");
        let fields: Vec<_> = tuple.keys().iter().map(|key| key.field).collect();
        assert_eq!(
            fields,
            vec![
                SortField::Score,
                SortField::SecondaryCount,
                SortField::CreatedDate,
                SortField::Id
            ]
        );
        assert!(
            tuple.keys()[..2]
                .iter()
                .all(|key| key.null_policy == NullPolicy::ZeroIfAbsent)
        );
    }

    #[test]
    fn sort_mode_names_parse_case_insensitively() {
        assert_eq!(SortMode::parse("Popular"), Some(SortMode::Hot));
        assert_eq!(SortMode::parse(" NEW "), Some(SortMode::New));
        assert_eq!(SortMode::parse("alpha"), Some(SortMode::Alpha));
        assert_eq!(SortMode::parse("random"), None);
    }

    #[test]
    fn tuple_for_name_defaults_to_hot_and_rejects_unknown_modes() {
        let tuple = tuple_for_name(ListingKind::Topics, None).expect("default");
        assert_eq!(tuple.mode(), SortMode::Hot);

        let err = tuple_for_name(ListingKind::Topics, Some("oldest")).expect_err("unknown");
        assert!(matches!(err, PaginationError::UnsupportedSortMode { .. }));
    }

    #[test]
    fn absent_aggregates_resolve_to_zero() {
        let tuple = tuple_for(ListingKind::Posts, SortMode::Hot).expect("tuple");
        let absent = Row {
            score: None,
            count: None,
            created: 10,
            id: 1,
        };
        let explicit = Row {
            score: Some(0),
            count: Some(0),
            created: 10,
            id: 1,
        };
        assert_eq!(
            tuple.values_of(&absent).expect("values"),
            tuple.values_of(&explicit).expect("values")
        );
    }

    #[test]
    fn required_fields_must_be_present() {
        let tuple = tuple_for(ListingKind::Posts, SortMode::Alpha).expect("tuple");
        let row = Row {
            score: None,
            count: None,
            created: 10,
            id: 1,
        };
        let err = tuple.values_of(&row).expect_err("title missing");
        assert_eq!(err, PaginationError::MissingSortValue(SortField::Title));
    }

    #[test]
    fn compare_breaks_ties_by_descending_id() {
        let tuple = tuple_for(ListingKind::Posts, SortMode::Hot).expect("tuple");
        let higher = tuple
            .values_of(&Row {
                score: Some(7),
                count: Some(0),
                created: 3,
                id: 3,
            })
            .expect("values");
        let lower = tuple
            .values_of(&Row {
                score: Some(7),
                count: Some(0),
                created: 3,
                id: 2,
            })
            .expect("values");
        assert_eq!(tuple.compare(&higher, &lower), Ordering::Less);
        assert_eq!(tuple.compare(&lower, &higher), Ordering::Greater);
        assert_eq!(tuple.compare(&lower, &lower), Ordering::Equal);
    }

    #[test]
    fn projection_coalesces_only_aggregates() {
        assert_eq!(
            NullPolicy::ZeroIfAbsent.project("math::sum($votes)", "score"),
            "(math::sum($votes) ?? 0) AS score"
        );
        assert_eq!(
            NullPolicy::Required.project("created_at_ms", "created_date"),
            "created_at_ms AS created_date"
        );
    }
}
