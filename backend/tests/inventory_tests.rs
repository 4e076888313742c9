//! Inventory write path tests
//!
//! Covers quantity updates, transfers, batch receipt, serial tracking,
//! reversals and the denormalized totals, over the in-memory store.

mod common;

use common::{admin, dec, Fixture};
use inventory_backend::{
    config::InventoryConfig,
    services::{InventoryEvent, NewBatch, TrackSerialsOptions, TransferOptions, UpdateOptions},
    store::InventoryStore,
    AppError,
};
use proptest::prelude::*;
use shared::{
    InventoryStatus, MovementType, OverdrawPolicy, TransactionFilter, TransactionStatus,
    TransactionType,
};
use uuid::Uuid;

fn batch(number: &str, quantity: i64) -> NewBatch {
    let mut batch = NewBatch::new(number, quantity);
    batch.cost_price = dec(500, 2);
    batch
}

fn sale() -> UpdateOptions {
    UpdateOptions::new(TransactionType::Sale, admin())
}

// ============================================================================
// Quantity updates
// ============================================================================

#[cfg(test)]
mod update_tests {
    use super::*;

    #[tokio::test]
    async fn test_update_requires_existing_record() {
        let fx = Fixture::new();
        let location = fx.location("WH1").await;
        let product = fx.product("Kettle", 5).await;

        let err = fx
            .state
            .inventory
            .update_quantity(product.id, location.id, 3, sale())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_writes_log_and_totals() {
        let fx = Fixture::new();
        let location = fx.location("WH1").await;
        let product = fx.product("Kettle", 5).await;
        fx.state
            .inventory
            .add_batch(product.id, location.id, batch("B1", 20), admin())
            .await
            .unwrap();

        let update = fx
            .state
            .inventory
            .update_quantity(product.id, location.id, -5, sale())
            .await
            .unwrap();

        assert_eq!(update.old_quantity, 20);
        assert_eq!(update.new_quantity, 15);
        assert_eq!(update.record.quantity, 15);
        assert_eq!(update.transaction.transaction_type, TransactionType::Sale);
        assert_eq!(update.transaction.quantity, 5);
        assert_eq!(update.transaction.from_location, Some(location.id));
        assert!(update.transaction.is_outbound());

        let last = update.record.movement_history.last().unwrap();
        assert_eq!(last.movement_type, MovementType::Sale);
        assert_eq!(last.quantity, -5);

        assert_eq!(fx.stored_product(product.id).await.stock, 15);
        assert_eq!(fx.stored_location(location.id).await.current_usage, 15);
    }

    #[tokio::test]
    async fn test_zero_delta_rejected() {
        let fx = Fixture::new();
        let err = fx
            .state
            .inventory
            .update_quantity(Uuid::new_v4(), Uuid::new_v4(), 0, sale())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_overdraw_clamps_by_default() {
        let fx = Fixture::new();
        let location = fx.location("WH1").await;
        let product = fx.product("Kettle", 0).await;
        fx.state
            .inventory
            .add_batch(product.id, location.id, batch("B1", 3), admin())
            .await
            .unwrap();

        let update = fx
            .state
            .inventory
            .update_quantity(product.id, location.id, -10, sale())
            .await
            .unwrap();
        assert_eq!(update.new_quantity, 0);
        // The log keeps the requested magnitude next to the applied change
        assert_eq!(update.transaction.quantity, 10);
        assert_eq!(update.transaction.applied_delta, -3);
        assert!(update.transaction.was_clamped());
        assert_eq!(update.record.movement_history.last().unwrap().quantity, -3);
        assert_eq!(fx.stored_product(product.id).await.stock, 0);
    }

    #[tokio::test]
    async fn test_reject_policy_leaves_state_untouched() {
        let fx = Fixture::new();
        let location = fx.location("WH1").await;
        let product = fx.product("Kettle", 0).await;
        fx.state
            .inventory
            .add_batch(product.id, location.id, batch("B1", 3), admin())
            .await
            .unwrap();

        let mut options = sale();
        options.policy = Some(OverdrawPolicy::Reject);
        let err = fx
            .state
            .inventory
            .update_quantity(product.id, location.id, -10, options)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::InsufficientStock {
                available: 3,
                requested: 10
            }
        ));
        assert_eq!(fx.quantity_at(product.id, location.id).await, 3);
        let sales = fx
            .state
            .inventory
            .list_transactions(&TransactionFilter {
                transaction_type: Some(TransactionType::Sale),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(sales.is_empty());
    }

    #[tokio::test]
    async fn test_configured_reject_default() {
        let fx = Fixture::with_config(InventoryConfig {
            overdraw_policy: OverdrawPolicy::Reject,
            ..Default::default()
        });
        let location = fx.location("WH1").await;
        let product = fx.product("Kettle", 0).await;
        fx.state
            .inventory
            .add_batch(product.id, location.id, batch("B1", 2), admin())
            .await
            .unwrap();

        let err = fx
            .state
            .inventory
            .update_quantity(product.id, location.id, -3, sale())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientStock { .. }));
    }

    #[tokio::test]
    async fn test_stale_version_is_a_conflict() {
        let fx = Fixture::new();
        let location = fx.location("WH1").await;
        let product = fx.product("Kettle", 0).await;
        let received = fx
            .state
            .inventory
            .add_batch(product.id, location.id, batch("B1", 8), admin())
            .await
            .unwrap();

        let mut first = sale();
        first.expected_version = Some(received.record.version);
        fx.state
            .inventory
            .update_quantity(product.id, location.id, -1, first)
            .await
            .unwrap();

        let mut stale = sale();
        stale.expected_version = Some(received.record.version);
        let err = fx
            .state
            .inventory
            .update_quantity(product.id, location.id, -1, stale)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ConcurrencyConflict(_)));
        assert_eq!(fx.quantity_at(product.id, location.id).await, 7);
    }

    #[tokio::test]
    async fn test_named_batch_is_targeted() {
        let fx = Fixture::new();
        let location = fx.location("WH1").await;
        let product = fx.product("Kettle", 0).await;
        let inventory = &fx.state.inventory;
        inventory
            .add_batch(product.id, location.id, batch("B1", 5), admin())
            .await
            .unwrap();
        inventory
            .add_batch(product.id, location.id, batch("B2", 5), admin())
            .await
            .unwrap();

        let mut options = sale();
        options.batch_number = Some("B2".into());
        let update = inventory
            .update_quantity(product.id, location.id, -2, options)
            .await
            .unwrap();
        assert_eq!(update.record.batch_number.as_deref(), Some("B2"));
        assert_eq!(update.new_quantity, 3);
        assert_eq!(update.transaction.batch_number.as_deref(), Some("B2"));
        assert_eq!(fx.stored_product(product.id).await.stock, 8);

        let mut missing = sale();
        missing.batch_number = Some("B9".into());
        let err = inventory
            .update_quantity(product.id, location.id, -1, missing)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_do_not_lose_deltas() {
        let fx = Fixture::new();
        let location = fx.location("WH1").await;
        let product = fx.product("Kettle", 0).await;
        fx.state
            .inventory
            .add_batch(product.id, location.id, batch("B1", 100), admin())
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..40 {
            let inventory = fx.state.inventory.clone();
            let (product_id, location_id) = (product.id, location.id);
            handles.push(tokio::spawn(async move {
                let delta = if i % 2 == 0 { 3 } else { -1 };
                let kind = if delta > 0 {
                    TransactionType::Return
                } else {
                    TransactionType::Sale
                };
                inventory
                    .update_quantity(product_id, location_id, delta, UpdateOptions::new(kind, admin()))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // 20 * 3 - 20 * 1
        assert_eq!(fx.quantity_at(product.id, location.id).await, 140);
        assert_eq!(fx.stored_product(product.id).await.stock, 140);
        let log = fx
            .state
            .inventory
            .list_transactions(&TransactionFilter::default())
            .await
            .unwrap();
        assert_eq!(log.len(), 41);
    }
}

// ============================================================================
// Transfers
// ============================================================================

#[cfg(test)]
mod transfer_tests {
    use super::*;

    #[tokio::test]
    async fn test_transfer_moves_stock_and_creates_destination() {
        let fx = Fixture::new();
        let l1 = fx.location("WH1").await;
        let l2 = fx.location("WH2").await;
        let product = fx.product("Kettle", 0).await;
        fx.state
            .inventory
            .add_batch(product.id, l1.id, batch("B1", 10), admin())
            .await
            .unwrap();

        let result = fx
            .state
            .inventory
            .transfer(product.id, l1.id, l2.id, 4, admin(), TransferOptions::default())
            .await
            .unwrap();

        assert_eq!(result.source.new_quantity, 6);
        assert_eq!(result.destination.old_quantity, 0);
        assert_eq!(result.destination.new_quantity, 4);
        assert_eq!(result.destination.record.batch_number.as_deref(), Some("B1"));
        assert_eq!(result.destination.record.cost_price, dec(500, 2));

        // Both legs carry the same reference
        assert_eq!(
            result.source.transaction.reference_id.as_deref(),
            Some(result.reference_id.as_str())
        );
        assert_eq!(
            result.destination.transaction.reference_id,
            result.source.transaction.reference_id
        );
        assert!(result.source.transaction.is_outbound());
        assert!(!result.destination.transaction.is_outbound());

        assert_eq!(fx.stored_product(product.id).await.stock, 10);
        assert_eq!(fx.stored_location(l1.id).await.current_usage, 6);
        assert_eq!(fx.stored_location(l2.id).await.current_usage, 4);
    }

    #[tokio::test]
    async fn test_transfer_rejects_insufficient_stock() {
        let fx = Fixture::new();
        let l1 = fx.location("WH1").await;
        let l2 = fx.location("WH2").await;
        let product = fx.product("Kettle", 0).await;
        fx.state
            .inventory
            .add_batch(product.id, l1.id, batch("B1", 3), admin())
            .await
            .unwrap();

        let err = fx
            .state
            .inventory
            .transfer(product.id, l1.id, l2.id, 4, admin(), TransferOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::InsufficientStock {
                available: 3,
                requested: 4
            }
        ));
        assert_eq!(fx.quantity_at(product.id, l1.id).await, 3);
        assert_eq!(fx.quantity_at(product.id, l2.id).await, 0);
    }

    #[tokio::test]
    async fn test_transfer_input_validation() {
        let fx = Fixture::new();
        let l1 = fx.location("WH1").await;
        let inventory = &fx.state.inventory;

        let err = inventory
            .transfer(Uuid::new_v4(), l1.id, l1.id, 1, admin(), TransferOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));

        let err = inventory
            .transfer(Uuid::new_v4(), l1.id, Uuid::new_v4(), 0, admin(), TransferOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_failed_destination_leg_rolls_back_source() {
        let fx = Fixture::new();
        let l1 = fx.location("WH1").await;
        let l2 = fx.location("WH2").await;
        let product = fx.product("Scanner", 0).await;
        let inventory = &fx.state.inventory;
        inventory
            .add_batch(product.id, l1.id, batch("B1", 10), admin())
            .await
            .unwrap();
        // Destination scope tracks serials, so an unserialized credit must fail
        inventory
            .track_serials(
                product.id,
                l2.id,
                vec!["SN-1".into()],
                TrackSerialsOptions {
                    batch_number: Some("B1".into()),
                    notes: None,
                },
                admin(),
            )
            .await
            .unwrap();

        let before = inventory
            .list_transactions(&TransactionFilter::default())
            .await
            .unwrap()
            .len();
        let err = inventory
            .transfer(product.id, l1.id, l2.id, 4, admin(), TransferOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));

        assert_eq!(fx.quantity_at(product.id, l1.id).await, 10);
        assert_eq!(fx.quantity_at(product.id, l2.id).await, 1);
        assert_eq!(fx.stored_product(product.id).await.stock, 11);
        let after = inventory
            .list_transactions(&TransactionFilter::default())
            .await
            .unwrap()
            .len();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_transfer_moves_serials() {
        let fx = Fixture::new();
        let l1 = fx.location("WH1").await;
        let l2 = fx.location("WH2").await;
        let product = fx.product("Scanner", 0).await;
        let inventory = &fx.state.inventory;
        inventory
            .track_serials(
                product.id,
                l1.id,
                vec!["SN-1".into(), "SN-2".into(), "SN-3".into()],
                TrackSerialsOptions::default(),
                admin(),
            )
            .await
            .unwrap();

        let options = TransferOptions {
            serial_numbers: vec!["SN-2".into()],
            ..Default::default()
        };
        let result = inventory
            .transfer(product.id, l1.id, l2.id, 1, admin(), options)
            .await
            .unwrap();
        assert_eq!(result.source.record.serial_numbers, vec!["SN-1", "SN-3"]);
        assert_eq!(result.destination.record.serial_numbers, vec!["SN-2"]);

        let found = inventory.find_serial("SN-2").await.unwrap();
        assert_eq!(found.location_id, l2.id);
    }
}

// ============================================================================
// Batches and serials
// ============================================================================

#[cfg(test)]
mod batch_serial_tests {
    use super::*;

    #[tokio::test]
    async fn test_add_batch_creates_record_and_purchase() {
        let fx = Fixture::new();
        let location = fx.location("WH1").await;
        let product = fx.product("Kettle", 0).await;

        let received = fx
            .state
            .inventory
            .add_batch(product.id, location.id, batch("B1", 20), admin())
            .await
            .unwrap();

        assert_eq!(received.record.quantity, 20);
        assert_eq!(received.record.status, InventoryStatus::Active);
        assert_eq!(received.record.movement_history.len(), 1);
        assert_eq!(received.record.movement_history[0].movement_type, MovementType::Received);
        assert_eq!(received.transaction.transaction_type, TransactionType::Purchase);
        assert_eq!(received.transaction.total_value, Some(dec(10000, 2)));
    }

    #[tokio::test]
    async fn test_duplicate_batch_changes_nothing() {
        let fx = Fixture::new();
        let location = fx.location("WH1").await;
        let product = fx.product("Kettle", 0).await;
        let inventory = &fx.state.inventory;
        inventory
            .add_batch(product.id, location.id, batch("B1", 20), admin())
            .await
            .unwrap();

        let err = inventory
            .add_batch(product.id, location.id, batch("B1", 7), admin())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateBatch(ref b) if b == "B1"));
        assert_eq!(fx.quantity_at(product.id, location.id).await, 20);
        assert_eq!(fx.stored_product(product.id).await.stock, 20);
        assert_eq!(
            inventory
                .list_transactions(&TransactionFilter::default())
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_same_batch_at_other_location_is_fine() {
        let fx = Fixture::new();
        let l1 = fx.location("WH1").await;
        let l2 = fx.location("WH2").await;
        let product = fx.product("Kettle", 0).await;
        let inventory = &fx.state.inventory;
        inventory
            .add_batch(product.id, l1.id, batch("B1", 2), admin())
            .await
            .unwrap();
        inventory
            .add_batch(product.id, l2.id, batch("B1", 3), admin())
            .await
            .unwrap();
        assert_eq!(fx.stored_product(product.id).await.stock, 5);
    }

    #[tokio::test]
    async fn test_add_batch_validation() {
        let fx = Fixture::new();
        let location = fx.location("WH1").await;
        let product = fx.product("Kettle", 0).await;
        let inventory = &fx.state.inventory;

        let err = inventory
            .add_batch(product.id, location.id, batch("B1", 0), admin())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "quantity"));

        let mut negative = batch("B1", 2);
        negative.cost_price = dec(-1, 0);
        let err = inventory
            .add_batch(product.id, location.id, negative, admin())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "costPrice"));

        let err = inventory
            .add_batch(Uuid::new_v4(), location.id, batch("B1", 2), admin())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_track_serials_derives_quantity() {
        let fx = Fixture::new();
        let location = fx.location("WH1").await;
        let product = fx.product("Scanner", 0).await;
        let inventory = &fx.state.inventory;

        let first = inventory
            .track_serials(
                product.id,
                location.id,
                vec!["SN-1".into(), "SN-2".into()],
                TrackSerialsOptions::default(),
                admin(),
            )
            .await
            .unwrap();
        assert_eq!(first.new_quantity, 2);

        let second = inventory
            .track_serials(
                product.id,
                location.id,
                vec!["SN-3".into()],
                TrackSerialsOptions::default(),
                admin(),
            )
            .await
            .unwrap();
        assert_eq!(second.record.id, first.record.id);
        assert_eq!(second.new_quantity, 3);
        assert_eq!(second.record.serial_numbers, vec!["SN-1", "SN-2", "SN-3"]);
        assert_eq!(fx.stored_product(product.id).await.stock, 3);
    }

    #[tokio::test]
    async fn test_serials_are_globally_unique() {
        let fx = Fixture::new();
        let l1 = fx.location("WH1").await;
        let l2 = fx.location("WH2").await;
        let product = fx.product("Scanner", 0).await;
        let inventory = &fx.state.inventory;
        inventory
            .track_serials(product.id, l1.id, vec!["SN-1".into()], TrackSerialsOptions::default(), admin())
            .await
            .unwrap();

        let err = inventory
            .track_serials(product.id, l2.id, vec!["SN-1".into()], TrackSerialsOptions::default(), admin())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateSerial(ref s) if s == "SN-1"));
        assert_eq!(fx.quantity_at(product.id, l2.id).await, 0);

        let err = inventory
            .track_serials(
                product.id,
                l1.id,
                vec!["SN-2".into(), "SN-2".into()],
                TrackSerialsOptions::default(),
                admin(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_serial_tracked_sale_names_serials() {
        let fx = Fixture::new();
        let location = fx.location("WH1").await;
        let product = fx.product("Scanner", 0).await;
        let inventory = &fx.state.inventory;
        inventory
            .track_serials(
                product.id,
                location.id,
                vec!["SN-1".into(), "SN-2".into()],
                TrackSerialsOptions::default(),
                admin(),
            )
            .await
            .unwrap();

        let err = inventory
            .update_quantity(product.id, location.id, -1, sale())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));

        let mut options = sale();
        options.serial_numbers = vec!["SN-1".into()];
        let update = inventory
            .update_quantity(product.id, location.id, -1, options)
            .await
            .unwrap();
        assert_eq!(update.new_quantity, 1);
        assert!(matches!(inventory.find_serial("SN-1").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_serials_refused_on_untracked_stock() {
        let fx = Fixture::new();
        let location = fx.location("WH1").await;
        let product = fx.product("Scanner", 0).await;
        let inventory = &fx.state.inventory;
        inventory
            .add_batch(product.id, location.id, batch("B1", 5), admin())
            .await
            .unwrap();

        let err = inventory
            .track_serials(
                product.id,
                location.id,
                vec!["SN-1".into(), "SN-2".into()],
                TrackSerialsOptions {
                    batch_number: Some("B1".into()),
                    notes: None,
                },
                admin(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "serialNumbers"));

        assert_eq!(fx.quantity_at(product.id, location.id).await, 5);
        assert_eq!(fx.stored_product(product.id).await.stock, 5);
        assert!(matches!(inventory.find_serial("SN-1").await, Err(AppError::NotFound(_))));
        assert_eq!(
            inventory
                .list_transactions(&TransactionFilter::default())
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_find_serial() {
        let fx = Fixture::new();
        let location = fx.location("WH1").await;
        let product = fx.product("Scanner", 0).await;
        let inventory = &fx.state.inventory;
        inventory
            .track_serials(
                product.id,
                location.id,
                vec!["SN-7".into()],
                TrackSerialsOptions {
                    batch_number: Some("LOT-A".into()),
                    notes: None,
                },
                admin(),
            )
            .await
            .unwrap();

        let found = inventory.find_serial("SN-7").await.unwrap();
        assert_eq!(found.product_id, product.id);
        assert_eq!(found.location_id, location.id);
        assert_eq!(found.batch_number.as_deref(), Some("LOT-A"));
        assert_eq!(found.status, InventoryStatus::Active);

        assert!(matches!(
            inventory.find_serial("SN-404").await,
            Err(AppError::NotFound(_))
        ));
    }
}

// ============================================================================
// Status, reversal, views
// ============================================================================

#[cfg(test)]
mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_quarantine_excludes_from_available() {
        let fx = Fixture::new();
        let location = fx.location("WH1").await;
        let product = fx.product("Kettle", 0).await;
        let inventory = &fx.state.inventory;
        let b1 = inventory
            .add_batch(product.id, location.id, batch("B1", 6), admin())
            .await
            .unwrap();
        inventory
            .add_batch(product.id, location.id, batch("B2", 4), admin())
            .await
            .unwrap();

        let view = inventory.get_product_inventory(product.id).await.unwrap();
        assert_eq!(view.available_quantity, 10);

        let record = inventory
            .set_record_status(b1.record.id, InventoryStatus::Quarantined, admin(), Some("recall".into()))
            .await
            .unwrap();
        assert_eq!(record.status, InventoryStatus::Quarantined);
        assert_eq!(
            record.movement_history.last().unwrap().movement_type,
            MovementType::StatusChange
        );

        let view = inventory.get_product_inventory(product.id).await.unwrap();
        assert_eq!(view.total_quantity, 10);
        assert_eq!(view.available_quantity, 4);
    }

    #[tokio::test]
    async fn test_cached_views_are_invalidated_on_write() {
        let fx = Fixture::new();
        let location = fx.location("WH1").await;
        let product = fx.product("Kettle", 0).await;
        let inventory = &fx.state.inventory;
        inventory
            .add_batch(product.id, location.id, batch("B1", 20), admin())
            .await
            .unwrap();

        assert_eq!(inventory.get_product_inventory(product.id).await.unwrap().total_quantity, 20);
        assert_eq!(inventory.get_location_inventory(location.id).await.unwrap().total_quantity, 20);

        inventory
            .update_quantity(product.id, location.id, -5, sale())
            .await
            .unwrap();

        assert_eq!(inventory.get_product_inventory(product.id).await.unwrap().total_quantity, 15);
        let at_location = inventory.get_location_inventory(location.id).await.unwrap();
        assert_eq!(at_location.total_quantity, 15);
        assert_eq!(at_location.total_value, dec(7500, 2));
    }

    #[tokio::test]
    async fn test_reverse_sale() {
        let fx = Fixture::new();
        let location = fx.location("WH1").await;
        let product = fx.product("Kettle", 0).await;
        let inventory = &fx.state.inventory;
        inventory
            .add_batch(product.id, location.id, batch("B1", 20), admin())
            .await
            .unwrap();
        let sold = inventory
            .update_quantity(product.id, location.id, -5, sale())
            .await
            .unwrap();

        let reversal = inventory
            .reverse_transaction(sold.transaction.id, admin(), Some("customer refund".into()))
            .await
            .unwrap();
        assert_eq!(reversal.new_quantity, 20);
        assert_eq!(reversal.transaction.transaction_type, TransactionType::Return);
        assert_eq!(reversal.transaction.quantity, 5);
        let original_id = sold.transaction.id.to_string();
        assert_eq!(reversal.transaction.reference_id.as_deref(), Some(original_id.as_str()));

        let original = fx.store.get_transaction(sold.transaction.id).await.unwrap().unwrap();
        assert_eq!(original.status, TransactionStatus::Reversed);
        assert_eq!(fx.stored_product(product.id).await.stock, 20);

        let err = inventory
            .reverse_transaction(sold.transaction.id, admin(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidStateTransition(_)));
    }

    #[tokio::test]
    async fn test_reverse_purchase_rejects_overdraw() {
        let fx = Fixture::new();
        let location = fx.location("WH1").await;
        let product = fx.product("Kettle", 0).await;
        let inventory = &fx.state.inventory;
        let received = inventory
            .add_batch(product.id, location.id, batch("B1", 5), admin())
            .await
            .unwrap();
        inventory
            .update_quantity(product.id, location.id, -3, sale())
            .await
            .unwrap();

        let err = inventory
            .reverse_transaction(received.transaction.id, admin(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientStock { .. }));
        let original = fx.store.get_transaction(received.transaction.id).await.unwrap().unwrap();
        assert_eq!(original.status, TransactionStatus::Completed);
    }

    #[tokio::test]
    async fn test_transfer_legs_cannot_be_reversed() {
        let fx = Fixture::new();
        let l1 = fx.location("WH1").await;
        let l2 = fx.location("WH2").await;
        let product = fx.product("Kettle", 0).await;
        let inventory = &fx.state.inventory;
        inventory
            .add_batch(product.id, l1.id, batch("B1", 5), admin())
            .await
            .unwrap();
        let moved = inventory
            .transfer(product.id, l1.id, l2.id, 2, admin(), TransferOptions::default())
            .await
            .unwrap();

        let err = inventory
            .reverse_transaction(moved.source.transaction.id, admin(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidStateTransition(_)));
    }

    #[tokio::test]
    async fn test_reverse_uses_logged_direction_not_type() {
        let fx = Fixture::new();
        let location = fx.location("WH1").await;
        let product = fx.product("Kettle", 0).await;
        let inventory = &fx.state.inventory;
        inventory
            .add_batch(product.id, location.id, batch("B1", 10), admin())
            .await
            .unwrap();

        // A return that took stock out
        let outbound_return = inventory
            .update_quantity(
                product.id,
                location.id,
                -2,
                UpdateOptions::new(TransactionType::Return, admin()),
            )
            .await
            .unwrap();
        assert_eq!(outbound_return.new_quantity, 8);
        assert!(outbound_return.transaction.is_outbound());
        let reversal = inventory
            .reverse_transaction(outbound_return.transaction.id, admin(), None)
            .await
            .unwrap();
        assert_eq!(reversal.new_quantity, 10);
        assert_eq!(reversal.transaction.applied_delta, 2);

        // Damage booked as an increase
        let inbound_damage = inventory
            .update_quantity(
                product.id,
                location.id,
                4,
                UpdateOptions::new(TransactionType::Damage, admin()),
            )
            .await
            .unwrap();
        assert_eq!(inbound_damage.new_quantity, 14);
        assert!(!inbound_damage.transaction.is_outbound());
        let reversal = inventory
            .reverse_transaction(inbound_damage.transaction.id, admin(), None)
            .await
            .unwrap();
        assert_eq!(reversal.new_quantity, 10);
        assert_eq!(reversal.transaction.applied_delta, -4);
        assert_eq!(fx.stored_product(product.id).await.stock, 10);
    }

    #[tokio::test]
    async fn test_reverse_clamped_sale_restores_applied_amount() {
        let fx = Fixture::new();
        let location = fx.location("WH1").await;
        let product = fx.product("Kettle", 0).await;
        let inventory = &fx.state.inventory;
        inventory
            .add_batch(product.id, location.id, batch("B1", 3), admin())
            .await
            .unwrap();
        let sold = inventory
            .update_quantity(product.id, location.id, -10, sale())
            .await
            .unwrap();
        assert_eq!(sold.new_quantity, 0);

        let reversal = inventory
            .reverse_transaction(sold.transaction.id, admin(), None)
            .await
            .unwrap();
        assert_eq!(reversal.new_quantity, 3);
        assert_eq!(reversal.transaction.transaction_type, TransactionType::Return);
        assert_eq!(reversal.transaction.quantity, 3);
        assert!(!reversal.transaction.was_clamped());
        assert_eq!(fx.stored_product(product.id).await.stock, 3);
        assert_eq!(fx.stored_location(location.id).await.current_usage, 3);
    }

    #[tokio::test]
    async fn test_entry_that_moved_nothing_cannot_be_reversed() {
        let fx = Fixture::new();
        let location = fx.location("WH1").await;
        let product = fx.product("Kettle", 0).await;
        let inventory = &fx.state.inventory;
        inventory
            .add_batch(product.id, location.id, batch("B1", 3), admin())
            .await
            .unwrap();
        inventory
            .update_quantity(product.id, location.id, -3, sale())
            .await
            .unwrap();
        let empty_sale = inventory
            .update_quantity(product.id, location.id, -5, sale())
            .await
            .unwrap();
        assert_eq!(empty_sale.transaction.applied_delta, 0);

        let err = inventory
            .reverse_transaction(empty_sale.transaction.id, admin(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidStateTransition(_)));
        assert_eq!(fx.quantity_at(product.id, location.id).await, 0);
        let original = fx.store.get_transaction(empty_sale.transaction.id).await.unwrap().unwrap();
        assert_eq!(original.status, TransactionStatus::Completed);
    }

    #[tokio::test]
    async fn test_reverse_serial_tracking() {
        let fx = Fixture::new();
        let location = fx.location("WH1").await;
        let product = fx.product("Scanner", 0).await;
        let inventory = &fx.state.inventory;
        inventory
            .track_serials(
                product.id,
                location.id,
                vec!["SN-1".into()],
                TrackSerialsOptions::default(),
                admin(),
            )
            .await
            .unwrap();
        let tracked = inventory
            .track_serials(
                product.id,
                location.id,
                vec!["SN-2".into(), "SN-3".into()],
                TrackSerialsOptions::default(),
                admin(),
            )
            .await
            .unwrap();
        assert_eq!(tracked.transaction.applied_delta, 2);

        let reversal = inventory
            .reverse_transaction(tracked.transaction.id, admin(), None)
            .await
            .unwrap();
        assert_eq!(reversal.new_quantity, 1);
        assert_eq!(reversal.record.serial_numbers, vec!["SN-1"]);
        assert!(matches!(inventory.find_serial("SN-3").await, Err(AppError::NotFound(_))));
        assert_eq!(fx.stored_product(product.id).await.stock, 1);
    }

    #[tokio::test]
    async fn test_update_counterpart_must_differ() {
        let fx = Fixture::new();
        let location = fx.location("WH1").await;
        let product = fx.product("Kettle", 0).await;
        fx.state
            .inventory
            .add_batch(product.id, location.id, batch("B1", 5), admin())
            .await
            .unwrap();

        let mut options = sale();
        options.to_location_id = Some(location.id);
        let err = fx
            .state
            .inventory
            .update_quantity(product.id, location.id, -1, options)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "toLocationId"));
        assert_eq!(fx.quantity_at(product.id, location.id).await, 5);
    }

    #[tokio::test]
    async fn test_location_code_validation_and_uniqueness() {
        let fx = Fixture::new();
        fx.location("WH1").await;
        let inventory = &fx.state.inventory;

        let err = inventory
            .create_location(shared::NewLocation::new("Dup", "WH1", shared::LocationType::Store))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateEntry(_)));

        let err = inventory
            .create_location(shared::NewLocation::new("Bad", "wh 1", shared::LocationType::Store))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "code"));
    }

    #[tokio::test]
    async fn test_negative_threshold_rejected() {
        let fx = Fixture::new();
        let err = fx
            .state
            .inventory
            .register_product(shared::Product::new("Kettle", -1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "reorderThreshold"));
    }

    #[tokio::test]
    async fn test_change_event_is_broadcast() {
        let fx = Fixture::new();
        let location = fx.location("WH1").await;
        let product = fx.product("Kettle", 0).await;
        fx.state
            .inventory
            .add_batch(product.id, location.id, batch("B1", 20), admin())
            .await
            .unwrap();

        let mut events = fx.state.events.subscribe();
        fx.state
            .inventory
            .update_quantity(product.id, location.id, -5, sale())
            .await
            .unwrap();

        match events.recv().await.unwrap() {
            InventoryEvent::InventoryChanged {
                old_quantity,
                new_quantity,
                transaction_type,
                ..
            } => {
                assert_eq!(old_quantity, 20);
                assert_eq!(new_quantity, 15);
                assert_eq!(transaction_type, TransactionType::Sale);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_broken_sinks_do_not_fail_writes() {
        let fx = Fixture::with_broken_sinks();
        let location = fx.location("WH1").await;
        let product = fx.product("Kettle", 0).await;

        fx.state
            .inventory
            .add_batch(product.id, location.id, batch("B1", 20), admin())
            .await
            .unwrap();
        let update = fx
            .state
            .inventory
            .update_quantity(product.id, location.id, -5, sale())
            .await
            .unwrap();
        assert_eq!(update.new_quantity, 15);
    }
}

// ============================================================================
// Property Tests
// ============================================================================

fn delta_strategy() -> impl Strategy<Value = i64> {
    prop_oneof![-30i64..0, 1i64..30]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Quantities never go negative and Product.stock always equals the record sum
    #[test]
    fn prop_non_negative_and_denormalized(
        initial in 1i64..50,
        deltas in prop::collection::vec(delta_strategy(), 1..20),
    ) {
        tokio_test::block_on(async {
            let fx = Fixture::new();
            let location = fx.location("WH1").await;
            let product = fx.product("Kettle", 0).await;
            fx.state
                .inventory
                .add_batch(product.id, location.id, batch("B1", initial), admin())
                .await
                .unwrap();

            for delta in deltas {
                let kind = if delta < 0 { TransactionType::Sale } else { TransactionType::Return };
                let update = fx
                    .state
                    .inventory
                    .update_quantity(product.id, location.id, delta, UpdateOptions::new(kind, admin()))
                    .await
                    .unwrap();
                assert!(update.new_quantity >= 0);
                assert_eq!(update.new_quantity, (update.old_quantity + delta).max(0));
                assert_eq!(fx.stored_product(product.id).await.stock, fx.record_total(product.id).await);
                assert_eq!(
                    fx.stored_location(location.id).await.current_usage,
                    update.new_quantity
                );
            }
        });
    }

    /// Transfers conserve the combined stock of both locations
    #[test]
    fn prop_transfer_conserves_stock(
        source in 1i64..100,
        dest in 1i64..100,
        pct in 1i64..=100,
    ) {
        tokio_test::block_on(async {
            let fx = Fixture::new();
            let l1 = fx.location("WH1").await;
            let l2 = fx.location("WH2").await;
            let product = fx.product("Kettle", 0).await;
            let inventory = &fx.state.inventory;
            inventory.add_batch(product.id, l1.id, batch("B1", source), admin()).await.unwrap();
            inventory.add_batch(product.id, l2.id, batch("B2", dest), admin()).await.unwrap();

            let quantity = (source * pct / 100).max(1);
            inventory
                .transfer(product.id, l1.id, l2.id, quantity, admin(), TransferOptions::default())
                .await
                .unwrap();

            let after_source = fx.quantity_at(product.id, l1.id).await;
            let after_dest = fx.quantity_at(product.id, l2.id).await;
            assert_eq!(after_source, source - quantity);
            assert_eq!(after_source + after_dest, source + dest);
            assert_eq!(fx.stored_product(product.id).await.stock, source + dest);
        });
    }

    /// Reversing an update restores the balance it started from, whatever its type
    #[test]
    fn prop_reversal_restores_balance(
        initial in 1i64..50,
        delta in delta_strategy(),
        kind in prop::sample::select(vec![
            TransactionType::Purchase,
            TransactionType::Sale,
            TransactionType::Adjustment,
            TransactionType::Return,
            TransactionType::Damage,
            TransactionType::WriteOff,
        ]),
    ) {
        tokio_test::block_on(async {
            let fx = Fixture::new();
            let location = fx.location("WH1").await;
            let product = fx.product("Kettle", 0).await;
            let inventory = &fx.state.inventory;
            inventory
                .add_batch(product.id, location.id, batch("B1", initial), admin())
                .await
                .unwrap();

            let update = inventory
                .update_quantity(product.id, location.id, delta, UpdateOptions::new(kind, admin()))
                .await
                .unwrap();
            assert_eq!(update.transaction.applied_delta, update.new_quantity - initial);

            let reversal = inventory
                .reverse_transaction(update.transaction.id, admin(), None)
                .await
                .unwrap();
            assert_eq!(reversal.new_quantity, initial);
            assert_eq!(fx.stored_product(product.id).await.stock, initial);
            assert_eq!(fx.stored_location(location.id).await.current_usage, initial);
        });
    }

    /// Serial tracking adds exactly the new serials to the count
    #[test]
    fn prop_serial_count(existing in 1usize..10, added in 1usize..10) {
        tokio_test::block_on(async {
            let fx = Fixture::new();
            let location = fx.location("WH1").await;
            let product = fx.product("Scanner", 0).await;
            let inventory = &fx.state.inventory;

            let first: Vec<String> = (0..existing).map(|i| format!("A-{}", i)).collect();
            let second: Vec<String> = (0..added).map(|i| format!("B-{}", i)).collect();
            inventory
                .track_serials(product.id, location.id, first, TrackSerialsOptions::default(), admin())
                .await
                .unwrap();
            let update = inventory
                .track_serials(product.id, location.id, second, TrackSerialsOptions::default(), admin())
                .await
                .unwrap();

            assert_eq!(update.new_quantity, (existing + added) as i64);
            let mut serials = update.record.serial_numbers.clone();
            serials.sort();
            serials.dedup();
            assert_eq!(serials.len(), existing + added);
        });
    }
}

