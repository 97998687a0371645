//! Consistency Coordinator.
//!
//! Orchestrates mutations that span the Catalog Store and the Asset
//! Store. No transaction covers both, so consistency is saga-style:
//!
//! - **Upload before commit.** A new image is uploaded first; the catalog
//!   write proceeds only if the upload succeeded. If the catalog write
//!   then fails (duplicate code, store unavailable), the speculative
//!   upload is deleted as compensation — best-effort, not retried, logged
//!   on failure, never escalated to the caller.
//! - **Commit before cleanup.** When a committed write replaces or drops
//!   an old asset, the old object is deleted afterward; a cleanup failure
//!   never undoes the committed catalog change.
//! - **Delete commits first.** Product deletion removes the catalog row,
//!   then attempts the asset delete.
//!
//! The one accepted leak: a speculative upload immediately followed by a
//! catalog connectivity failure can leave an orphaned object in the Asset
//! Store. That is reclaimed out-of-band, not here.
//!
//! Only this coordinator causes Asset Store side effects tied to a
//! product; the Catalog Store never calls the Asset Store.

use std::sync::Arc;

use tracing::warn;

use crate::assets::{AssetRef, ObjectStore};
use crate::catalog::{self, CatalogStore};
use crate::error::{CatalogError, CatalogResult};
use crate::import;
use crate::models::{
    ImageUpload, ImportSummary, Page, Product, ProductDraft, RemoveImageOutcome,
};
use crate::saga::{Saga, SagaState};

pub struct Coordinator {
    catalog: CatalogStore,
    assets: Arc<dyn ObjectStore>,
}

impl Coordinator {
    pub fn new(catalog: CatalogStore, assets: Arc<dyn ObjectStore>) -> Self {
        Self { catalog, assets }
    }

    /// Create a product, optionally with an image.
    pub async fn create_product(
        &self,
        draft: ProductDraft,
        image: Option<ImageUpload>,
    ) -> CatalogResult<Product> {
        let mut saga = Saga::begin("create");

        let new_ref = match image {
            Some(img) => Some(self.upload_image(&mut saga, &img).await?),
            None => None,
        };

        saga.advance(SagaState::CatalogWriting);
        match self
            .catalog
            .insert(&draft, new_ref.as_ref().map(AssetRef::as_str))
            .await
        {
            Ok(id) => {
                saga.advance(SagaState::Committed);
                Ok(assembled(id, draft, new_ref))
            }
            Err(e) => {
                saga.advance(SagaState::CatalogFailed);
                if let Some(reference) = new_ref {
                    self.compensate_upload(&mut saga, &reference).await;
                }
                Err(e)
            }
        }
    }

    /// Rewrite a product's fields, optionally swapping in a new image.
    /// Without a new image the existing reference is kept as-is.
    pub async fn update_product(
        &self,
        id: i64,
        draft: ProductDraft,
        image: Option<ImageUpload>,
    ) -> CatalogResult<Product> {
        let existing = self.get_product(id).await?;
        let mut saga = Saga::begin("update");

        let new_ref = match image {
            Some(img) => Some(self.upload_image(&mut saga, &img).await?),
            None => None,
        };

        let final_ref = new_ref
            .as_ref()
            .map(|r| r.as_str().to_string())
            .or(existing.image_ref.clone());

        saga.advance(SagaState::CatalogWriting);
        match self.catalog.update(id, &draft, final_ref.as_deref()).await {
            Ok(()) => {
                saga.advance(SagaState::Committed);
                if new_ref.is_some() {
                    if let Some(old) = existing.image_ref {
                        self.discard_asset(&AssetRef(old)).await;
                    }
                }
                Ok(Product {
                    id,
                    code: draft.code,
                    name: draft.name,
                    description: draft.description,
                    price: draft.price,
                    image_ref: final_ref,
                })
            }
            Err(e) => {
                saga.advance(SagaState::CatalogFailed);
                if let Some(reference) = new_ref {
                    self.compensate_upload(&mut saga, &reference).await;
                }
                Err(e)
            }
        }
    }

    /// Replace a product's image, leaving its other fields untouched.
    pub async fn replace_image(&self, id: i64, image: ImageUpload) -> CatalogResult<Product> {
        let existing = self.get_product(id).await?;
        let old_ref = existing.image_ref.clone();
        let mut saga = Saga::begin("replace-image");

        let new_ref = self.upload_image(&mut saga, &image).await?;

        saga.advance(SagaState::CatalogWriting);
        match self.catalog.set_image_ref(id, Some(new_ref.as_str())).await {
            Ok(()) => {
                saga.advance(SagaState::Committed);
                if let Some(old) = old_ref {
                    self.discard_asset(&AssetRef(old)).await;
                }
                Ok(Product {
                    image_ref: Some(new_ref.0),
                    ..existing
                })
            }
            Err(e) => {
                saga.advance(SagaState::CatalogFailed);
                self.compensate_upload(&mut saga, &new_ref).await;
                Err(e)
            }
        }
    }

    /// Drop a product's image. The catalog column is cleared first; the
    /// asset delete runs after and its failure only warns — the reference
    /// must never dangle, the object at worst leaks.
    pub async fn remove_image(&self, id: i64) -> CatalogResult<RemoveImageOutcome> {
        let existing = self.get_product(id).await?;
        let Some(old) = existing.image_ref else {
            return Ok(RemoveImageOutcome::NothingToRemove);
        };

        let mut saga = Saga::begin("remove-image");
        saga.advance(SagaState::CatalogWriting);
        match self.catalog.set_image_ref(id, None).await {
            Ok(()) => {
                saga.advance(SagaState::Committed);
                self.discard_asset(&AssetRef(old)).await;
                Ok(RemoveImageOutcome::Removed)
            }
            Err(e) => {
                saga.advance(SagaState::CatalogFailed);
                Err(e)
            }
        }
    }

    /// Physically delete a product. Catalog deletion commits first; the
    /// asset delete is attempted after and never rolls it back.
    pub async fn delete_product(&self, id: i64) -> CatalogResult<()> {
        let existing = self.get_product(id).await?;

        let mut saga = Saga::begin("delete");
        saga.advance(SagaState::CatalogWriting);
        match self.catalog.delete(id).await {
            Ok(()) => {
                saga.advance(SagaState::Committed);
                if let Some(old) = existing.image_ref {
                    self.discard_asset(&AssetRef(old)).await;
                }
                Ok(())
            }
            Err(e) => {
                saga.advance(SagaState::CatalogFailed);
                Err(e)
            }
        }
    }

    pub async fn get_product(&self, id: i64) -> CatalogResult<Product> {
        self.catalog
            .get_by_id(id)
            .await?
            .ok_or(CatalogError::NotFound)
    }

    pub async fn find_by_code(&self, code: &str) -> CatalogResult<Option<Product>> {
        self.catalog.get_by_code(code).await
    }

    /// Filtered, paginated listing. `page` is 1-based and clamped.
    pub async fn list_products(
        &self,
        filter: Option<&str>,
        page: i64,
        page_size: i64,
    ) -> CatalogResult<Page> {
        catalog::list_products(&self.catalog, filter, page, page_size).await
    }

    /// Bulk-load a raw tabular batch. See [`crate::import`].
    pub async fn import_batch(&self, raw: &[u8]) -> CatalogResult<ImportSummary> {
        import::ingest(&self.catalog, raw).await
    }

    async fn upload_image(
        &self,
        saga: &mut Saga,
        image: &ImageUpload,
    ) -> CatalogResult<AssetRef> {
        saga.advance(SagaState::AssetUploading);
        // An upload failure aborts here: nothing is committed yet, so
        // there is nothing to compensate.
        let reference = self.assets.upload(&image.bytes, &image.content_type).await?;
        saga.advance(SagaState::AssetUploaded);
        Ok(reference)
    }

    /// Best-effort removal of a speculative upload after a catalog
    /// failure. Not retried; a failure here is operator-visible but the
    /// caller still receives the original catalog error.
    async fn compensate_upload(&self, saga: &mut Saga, reference: &AssetRef) {
        saga.advance(SagaState::Compensating);
        match self.assets.delete(reference).await {
            Ok(()) => saga.advance(SagaState::CompensationDone),
            Err(e) => {
                saga.advance(SagaState::CompensationFailed);
                warn!(%reference, error = %e, "compensation failed; uploaded object may be orphaned");
            }
        }
    }

    /// Best-effort removal of an asset made obsolete by an
    /// already-committed catalog change.
    async fn discard_asset(&self, reference: &AssetRef) {
        if let Err(e) = self.assets.delete(reference).await {
            warn!(%reference, error = %e, "failed to delete obsolete asset; object may be orphaned");
        }
    }
}

fn assembled(id: i64, draft: ProductDraft, image_ref: Option<AssetRef>) -> Product {
    Product {
        id,
        code: draft.code,
        name: draft.name,
        description: draft.description,
        price: draft.price,
        image_ref: image_ref.map(|r| r.0),
    }
}
