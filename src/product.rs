//! Product descriptors from the catalog.
//!
//! The catalog backend is an external collaborator; this module only reads the
//! fields the try-on needs from its JSON export.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{TryOnError, TryOnResult};

/// Category that supports wrist try-on.
pub const TRY_ON_CATEGORY: &str = "watches";

/// One catalog entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub brand: Option<String>,
    pub category: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Product photo, used as the 2D sprite.
    #[serde(default)]
    pub image_url: Option<String>,
    /// Path or URL of the 3D model.
    #[serde(default)]
    pub model_url: Option<String>,
    #[serde(default, alias = "has3DModel")]
    pub has_3d_model: bool,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub features: Vec<String>,
}

fn default_currency() -> String {
    "INR".to_string()
}

impl ProductDescriptor {
    /// Minimal watch entry with a sprite and no model.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            brand: None,
            category: TRY_ON_CATEGORY.to_string(),
            price: None,
            currency: default_currency(),
            image_url: None,
            model_url: None,
            has_3d_model: false,
            attributes: BTreeMap::new(),
            features: Vec::new(),
        }
    }

    pub fn with_sprite(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn with_model(mut self, url: impl Into<String>) -> Self {
        self.model_url = Some(url.into());
        self.has_3d_model = true;
        self
    }

    /// Whether a 3D load should be attempted.
    pub fn wants_3d(&self) -> bool {
        self.has_3d_model && self.model_url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }

    pub fn sprite_url(&self) -> Option<&str> {
        self.image_url.as_deref().filter(|u| !u.trim().is_empty())
    }

    /// A watch with a sprite or a model to overlay.
    pub fn supports_try_on(&self) -> bool {
        self.category.eq_ignore_ascii_case(TRY_ON_CATEGORY)
            && (self.sprite_url().is_some() || self.wants_3d())
    }
}

/// Products loaded from a catalog export.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    products: Vec<ProductDescriptor>,
}

impl Catalog {
    pub fn new(products: Vec<ProductDescriptor>) -> Self {
        Self { products }
    }

    /// Parses a JSON array, or an object with a `products` array.
    ///
    /// Entries that fail to parse are skipped with a warning.
    pub fn from_json(text: &str) -> TryOnResult<Self> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let entries = match value {
            serde_json::Value::Array(items) => items,
            serde_json::Value::Object(mut map) => match map.remove("products") {
                Some(serde_json::Value::Array(items)) => items,
                _ => {
                    return Err(TryOnError::config(
                        "catalog object has no 'products' array",
                    ));
                }
            },
            _ => return Err(TryOnError::config("catalog must be a JSON array")),
        };

        let mut products = Vec::with_capacity(entries.len());
        for entry in entries {
            let id = entry
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string();
            match serde_json::from_value::<ProductDescriptor>(entry) {
                Ok(product) => products.push(product),
                Err(e) => tracing::warn!(product = %id, error = %e, "skipping malformed product"),
            }
        }

        tracing::info!(count = products.len(), "catalog loaded");
        Ok(Self { products })
    }

    pub fn from_file(path: impl AsRef<Path>) -> TryOnResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    pub fn get(&self, id: &str) -> Option<&ProductDescriptor> {
        self.products.iter().find(|p| p.id == id)
    }

    pub fn products(&self) -> &[ProductDescriptor] {
        &self.products
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// The next try-on-capable product after `id`, wrapping around.
    pub fn next_try_on(&self, id: &str) -> Option<&ProductDescriptor> {
        let start = self.products.iter().position(|p| p.id == id).unwrap_or(0);
        let n = self.products.len();
        (1..=n)
            .map(|step| &self.products[(start + step) % n])
            .find(|p| p.supports_try_on())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"[
        {
            "id": "titan-1",
            "name": "Titan Raga",
            "brand": "Titan",
            "category": "watches",
            "price": 8999.0,
            "image_url": "sprites/titan-1.png",
            "model_url": "models/titan-1.json",
            "has_3d_model": true,
            "attributes": { "dial_color": "Silver" },
            "features": ["Water resistant"]
        },
        { "id": "bag-1", "name": "Tote", "category": "bags", "image_url": "bag.png" },
        { "id": "fast-1", "name": "Fastrack", "category": "Watches", "has3DModel": true, "image_url": "fast-1.png" },
        { "id": "bare-1", "name": "Sonata", "category": "watches" },
        { "name": "no id" }
    ]"#;

    #[test]
    fn parses_entries_and_skips_malformed() {
        let catalog = Catalog::from_json(CATALOG).unwrap();
        assert_eq!(catalog.len(), 4);

        let titan = catalog.get("titan-1").unwrap();
        assert_eq!(titan.currency, "INR");
        assert_eq!(titan.brand.as_deref(), Some("Titan"));
        assert_eq!(titan.attributes["dial_color"], "Silver");
        assert!(titan.wants_3d());
    }

    #[test]
    fn flag_without_model_url_does_not_want_3d() {
        let catalog = Catalog::from_json(CATALOG).unwrap();
        let fast = catalog.get("fast-1").unwrap();
        assert!(fast.has_3d_model);
        assert!(!fast.wants_3d());
        assert_eq!(fast.sprite_url(), Some("fast-1.png"));
        assert!(fast.supports_try_on());
    }

    #[test]
    fn wrapped_products_object_is_accepted() {
        let catalog = Catalog::from_json(&format!(r#"{{"products": {CATALOG}}}"#)).unwrap();
        assert_eq!(catalog.len(), 4);
        assert!(Catalog::from_json(r#"{"items": []}"#).is_err());
    }

    #[test]
    fn next_try_on_skips_other_categories_and_wraps() {
        let catalog = Catalog::from_json(CATALOG).unwrap();
        assert_eq!(catalog.next_try_on("titan-1").unwrap().id, "fast-1");
        assert_eq!(catalog.next_try_on("fast-1").unwrap().id, "titan-1");
        assert!(Catalog::default().next_try_on("x").is_none());
    }

    #[test]
    fn watch_without_sprite_or_model_is_not_try_on() {
        let catalog = Catalog::from_json(CATALOG).unwrap();
        let bare = catalog.get("bare-1").unwrap();
        assert!(!bare.supports_try_on());
        assert_eq!(catalog.next_try_on("fast-1").unwrap().id, "titan-1");

        let flagged = ProductDescriptor {
            has_3d_model: true,
            ..ProductDescriptor::new("f", "Flag only")
        };
        assert!(!flagged.supports_try_on());
        assert!(ProductDescriptor::new("m", "Model only").with_model("m.stl").supports_try_on());
    }

    #[test]
    fn builders_set_flags() {
        let p = ProductDescriptor::new("w", "Watch")
            .with_sprite("w.png")
            .with_model("w.stl");
        assert!(p.wants_3d());
        assert_eq!(p.sprite_url(), Some("w.png"));
    }
}
