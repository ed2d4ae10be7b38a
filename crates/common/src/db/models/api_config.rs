//! Lookup-service credential entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "api_configs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub api_key: String,

    /// At most one row has this set
    pub is_active: bool,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// API key with everything but the last four characters hidden
    pub fn masked_key(&self) -> String {
        let chars: Vec<char> = self.api_key.chars().collect();
        let visible = chars.len().min(4);
        let hidden = chars.len() - visible;
        let tail: String = chars[hidden..].iter().collect();
        format!("{}{}", "*".repeat(hidden), tail)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(key: &str) -> Model {
        Model {
            id: Uuid::new_v4(),
            api_key: key.to_string(),
            is_active: true,
            created_at: chrono::Utc::now().into(),
        }
    }

    #[test]
    fn test_masked_key() {
        assert_eq!(config("abcdef123456").masked_key(), "********3456");
        assert_eq!(config("abc").masked_key(), "abc");
    }
}
