//! Table identity resolution and typed item mapping.
//!
//! A scan targets either an explicitly named table or a [`TableModel`] type
//! that declares its table name and hash key.

use crate::store::Item;
use crate::{BoxError, Error, Result};
use serde::de::DeserializeOwned;
use std::fmt;

/// A type mapped onto a store table.
///
/// ```
/// use dynscan_core::schema::TableModel;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Order {
///     id: String,
///     total: f64,
/// }
///
/// impl TableModel for Order {
///     const TABLE_NAME: &'static str = "Orders";
///     const HASH_KEY: Option<&'static str> = Some("id");
/// }
/// ```
pub trait TableModel: DeserializeOwned {
    /// Name of the backing table
    const TABLE_NAME: &'static str;

    /// Hash (partition) key attribute; `None` makes the model unscannable
    const HASH_KEY: Option<&'static str>;
}

/// Which table a scan reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableIdentity {
    /// Explicit table name
    Named(String),
    /// Derived from a [`TableModel`] type
    Model {
        model: &'static str,
        table_name: &'static str,
        hash_key: Option<&'static str>,
    },
}

impl TableIdentity {
    /// Identity declared by a model type.
    pub fn of<M: TableModel>() -> Self {
        TableIdentity::Model {
            model: std::any::type_name::<M>(),
            table_name: M::TABLE_NAME,
            hash_key: M::HASH_KEY,
        }
    }

    /// Validate and return the table name.
    pub fn resolve(&self) -> Result<String> {
        match self {
            TableIdentity::Named(name) => {
                if name.trim().is_empty() {
                    return Err(Error::Config("Table name should not be empty".into()));
                }
                Ok(name.clone())
            }
            TableIdentity::Model {
                model,
                table_name,
                hash_key,
            } => {
                if table_name.trim().is_empty() {
                    return Err(Error::Config(format!(
                        "Model '{model}' should declare a valid table name"
                    )));
                }
                if hash_key.map_or(true, |key| key.trim().is_empty()) {
                    return Err(Error::Config(format!(
                        "Model '{model}' has no mapping for HASH key"
                    )));
                }
                Ok(table_name.to_string())
            }
        }
    }
}

impl fmt::Display for TableIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableIdentity::Named(name) => f.write_str(name),
            TableIdentity::Model {
                model, table_name, ..
            } => write!(f, "{table_name} ({model})"),
        }
    }
}

impl From<&str> for TableIdentity {
    fn from(name: &str) -> Self {
        TableIdentity::Named(name.to_string())
    }
}

impl From<String> for TableIdentity {
    fn from(name: String) -> Self {
        TableIdentity::Named(name)
    }
}

/// Map a raw item onto a model type.
pub fn from_item<M: DeserializeOwned>(item: Item) -> std::result::Result<M, BoxError> {
    Ok(serde_json::from_value(serde_json::Value::Object(item))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Product {
        id: String,
        price: u32,
    }

    impl TableModel for Product {
        const TABLE_NAME: &'static str = "Products";
        const HASH_KEY: Option<&'static str> = Some("id");
    }

    #[derive(Debug, Deserialize)]
    struct EmptyTableName {}

    impl TableModel for EmptyTableName {
        const TABLE_NAME: &'static str = "";
        const HASH_KEY: Option<&'static str> = Some("id");
    }

    #[derive(Debug, Deserialize)]
    struct NoHashKey {}

    impl TableModel for NoHashKey {
        const TABLE_NAME: &'static str = "Products";
        const HASH_KEY: Option<&'static str> = None;
    }

    fn item(value: serde_json::Value) -> Item {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_resolve_named() {
        let identity = TableIdentity::from("Orders");
        assert_eq!(identity.resolve().unwrap(), "Orders");
        assert_eq!(identity.to_string(), "Orders");
    }

    #[test]
    fn test_resolve_blank_name() {
        let err = TableIdentity::from("  ").resolve().unwrap_err();
        assert!(err.is_config());
        assert_eq!(
            err.to_string(),
            "Configuration error: Table name should not be empty"
        );
    }

    #[test]
    fn test_resolve_model() {
        let identity = TableIdentity::of::<Product>();
        assert_eq!(identity.resolve().unwrap(), "Products");
        assert!(identity.to_string().starts_with("Products ("));
    }

    #[test]
    fn test_resolve_model_without_table_name() {
        let err = TableIdentity::of::<EmptyTableName>().resolve().unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("valid table name"));
    }

    #[test]
    fn test_resolve_model_without_hash_key() {
        let err = TableIdentity::of::<NoHashKey>().resolve().unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("no mapping for HASH key"));
    }

    #[test]
    fn test_from_item() {
        let product: Product = from_item(item(json!({"id": "p-1", "price": 10}))).unwrap();
        assert_eq!(
            product,
            Product {
                id: "p-1".into(),
                price: 10
            }
        );
    }

    #[test]
    fn test_from_item_malformed() {
        let result: std::result::Result<Product, _> = from_item(item(json!({"id": "p-1"})));
        let err = result.unwrap_err();
        assert!(err.to_string().contains("price"));
    }
}
