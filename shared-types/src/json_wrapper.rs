//! Typed JSON wrapper for Diesel TEXT columns.
//!
//! Classification and insights are stored as JSON strings in TEXT columns.
//! This wrapper decodes them into their typed form at the persistence
//! boundary, so the rest of the code never touches a loose JSON blob.

use diesel::deserialize::{FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::serialize::{IsNull, Output, ToSql};
use diesel::sql_types::Text;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::ops::{Deref, DerefMut};

/// A wrapper that stores typed data as JSON in TEXT columns.
///
/// # Example
///
/// ```ignore
/// use shared_types::{EmailClassification, JsonWrapper};
///
/// // In a database model:
/// pub struct SwipeRow {
///     pub ai_classification: Option<JsonWrapper<EmailClassification>>,
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[serde(transparent)]
#[diesel(sql_type = Text)]
pub struct JsonWrapper<T>(pub T);

impl<T> JsonWrapper<T> {
    pub fn new(value: T) -> Self {
        JsonWrapper(value)
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: Default> Default for JsonWrapper<T> {
    fn default() -> Self {
        JsonWrapper(T::default())
    }
}

impl<T> Deref for JsonWrapper<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for JsonWrapper<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<T> From<T> for JsonWrapper<T> {
    fn from(value: T) -> Self {
        JsonWrapper(value)
    }
}

impl<T: fmt::Display> fmt::Display for JsonWrapper<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<T> FromSql<Text, Pg> for JsonWrapper<T>
where
    T: DeserializeOwned,
{
    fn from_sql(bytes: PgValue<'_>) -> diesel::deserialize::Result<Self> {
        let s = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
        let value: T = serde_json::from_str(&s)
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;
        Ok(JsonWrapper(value))
    }
}

impl<T> ToSql<Text, Pg> for JsonWrapper<T>
where
    T: Serialize + fmt::Debug,
{
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> diesel::serialize::Result {
        let s = serde_json::to_string(&self.0)?;
        out.write_all(s.as_bytes())?;
        Ok(IsNull::No)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EmailClassification, TagScore};

    #[test]
    fn wrapper_is_transparent_in_json() {
        let classification = EmailClassification {
            niches: vec![TagScore {
                name: "SaaS/Technology".to_string(),
                confidence: 88.0,
            }],
            ..Default::default()
        };
        let wrapped = JsonWrapper::new(classification.clone());

        let json = serde_json::to_string(&wrapped).unwrap();
        // No extra nesting introduced by the wrapper.
        assert_eq!(json, serde_json::to_string(&classification).unwrap());

        let parsed: JsonWrapper<EmailClassification> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.into_inner(), classification);
    }

    #[test]
    fn wrapper_deref() {
        let wrapped = JsonWrapper::new(vec!["launch".to_string(), "seo".to_string()]);
        assert_eq!(wrapped.len(), 2);
        assert_eq!(wrapped[0], "launch");
    }
}
