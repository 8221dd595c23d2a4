use anyhow::Result;
use async_trait::async_trait;
use shared::domain::EntityKind;
use tracing::debug;

/// Path-addressed blob access for entity images.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object(&self, path: &str) -> Result<Option<Vec<u8>>>;
    async fn put_object(&self, path: &str, bytes: Vec<u8>) -> Result<()>;
}

/// `images/<type>/<type>-<displayNum>[-<detail>].jpg`
pub fn image_path(kind: EntityKind, display_num: i64, detail: Option<&str>) -> String {
    let image_type = kind.image_type();
    match detail.map(str::trim).filter(|d| !d.is_empty()) {
        Some(detail) => format!("images/{image_type}/{image_type}-{display_num}-{detail}.jpg"),
        None => format!("images/{image_type}/{image_type}-{display_num}.jpg"),
    }
}

/// Loads the detail image when one is asked for and exists, otherwise the
/// entity's base image.
pub async fn load_image(
    store: &dyn ObjectStore,
    kind: EntityKind,
    display_num: i64,
    detail: Option<&str>,
) -> Result<Option<Vec<u8>>> {
    let detailed = image_path(kind, display_num, detail);
    if let Some(bytes) = store.get_object(&detailed).await? {
        return Ok(Some(bytes));
    }

    let base = image_path(kind, display_num, None);
    if base == detailed {
        return Ok(None);
    }
    debug!(%detailed, %base, "images: detail image missing, using base image");
    store.get_object(&base).await
}
