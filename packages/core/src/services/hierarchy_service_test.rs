//! Tests for HierarchyService
//!
//! Tests cover:
//! - Path derivation on create
//! - Ancestor / descendant queries, including multi-digit ids
//! - Moves: reparenting, detaching to root, moving roots with subtrees
//! - Cycle rejection and atomicity under injected store failures
//! - Delete with reparenting, rebuild repair, events, strict mode

#[cfg(test)]
mod tests {
    use crate::config::HierarchyConfig;
    use crate::db::{DomainEvent, HierarchyStore, HierarchyTransaction, MemoryStore};
    use crate::models::{IngredientId, IngredientNode, IngredientUpdate, MaterializedPath, NewIngredient};
    use crate::services::collaborators::{AttachmentError, MockAttachmentCleaner};
    use crate::services::{HierarchyError, HierarchyService};
    use std::sync::{Arc, Mutex};
    use tracing::field::{Field, Visit};
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    /// Helper to create a service over an empty in-memory store
    fn create_test_service() -> (HierarchyService<MemoryStore>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (HierarchyService::new(store.clone()), store)
    }

    /// Spirit(1) > { Whiskey(2) > { Bourbon(3) > Wheated(6), Rye(4) }, Gin(5) }
    async fn seed_bar(service: &HierarchyService<MemoryStore>) {
        let spirit = service.create_node(NewIngredient::new("Spirit")).await.unwrap();
        let whiskey = service
            .create_node(NewIngredient::new("Whiskey").with_parent(spirit.id))
            .await
            .unwrap();
        let bourbon = service
            .create_node(NewIngredient::new("Bourbon").with_parent(whiskey.id))
            .await
            .unwrap();
        service
            .create_node(NewIngredient::new("Rye").with_parent(whiskey.id))
            .await
            .unwrap();
        service
            .create_node(NewIngredient::new("Gin").with_parent(spirit.id))
            .await
            .unwrap();
        service
            .create_node(NewIngredient::new("Wheated").with_parent(bourbon.id))
            .await
            .unwrap();
    }

    async fn path_of(service: &HierarchyService<MemoryStore>, id: i64) -> Option<String> {
        service
            .get_node(IngredientId(id))
            .await
            .unwrap()
            .unwrap()
            .materialized_path
            .map(String::from)
    }

    /// Records the message of every WARN event
    struct WarningCapture(Arc<Mutex<Vec<String>>>);

    struct MessageVisitor<'a>(&'a mut String);

    impl Visit for MessageVisitor<'_> {
        fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
            if field.name() == "message" {
                self.0.push_str(&format!("{:?}", value));
            }
        }
    }

    impl<S: Subscriber> Layer<S> for WarningCapture {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() != Level::WARN {
                return;
            }
            let mut message = String::new();
            event.record(&mut MessageVisitor(&mut message));
            self.0.lock().unwrap().push(message);
        }
    }

    fn ids(nodes: &[IngredientNode]) -> Vec<i64> {
        nodes.iter().map(|n| n.id.0).collect()
    }

    /// Every node's path equals its parent's path plus the parent id
    async fn assert_consistent(store: &MemoryStore) {
        let nodes = store.snapshot().await;
        for node in &nodes {
            node.check_hierarchy().unwrap();
            if let Some(parent_id) = node.parent_id {
                let parent = nodes.iter().find(|n| n.id == parent_id).unwrap();
                let expected = crate::models::path::append(parent.materialized_path.as_ref(), parent.id);
                assert_eq!(node.materialized_path.as_ref(), Some(&expected), "node {}", node.id);
            }
        }
    }

    #[tokio::test]
    async fn test_create_derives_path_from_parent() {
        let (service, store) = create_test_service();
        seed_bar(&service).await;

        assert_eq!(path_of(&service, 1).await, None);
        assert_eq!(path_of(&service, 2).await.as_deref(), Some(".1."));
        assert_eq!(path_of(&service, 3).await.as_deref(), Some(".1.2."));
        assert_eq!(path_of(&service, 6).await.as_deref(), Some(".1.2.3."));
        assert_consistent(&store).await;
    }

    #[tokio::test]
    async fn test_create_under_missing_parent_fails() {
        let (service, store) = create_test_service();

        let err = service
            .create_node(NewIngredient::new("Orphan").with_parent(IngredientId(42)))
            .await
            .unwrap_err();

        assert!(matches!(err, HierarchyError::NodeNotFound { id } if id == IngredientId(42)));
        assert!(store.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_payload() {
        let (service, _store) = create_test_service();

        let err = service.create_node(NewIngredient::new("")).await.unwrap_err();
        assert!(matches!(err, HierarchyError::Validation(_)));
    }

    #[tokio::test]
    async fn test_ancestors_are_root_first() {
        let (service, _store) = create_test_service();
        seed_bar(&service).await;

        let ancestors = service.ancestors_of(IngredientId(6)).await.unwrap();
        assert_eq!(ids(&ancestors), vec![1, 2, 3]);

        assert!(service.ancestors_of(IngredientId(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_descendants_sorted_by_name() {
        let (service, _store) = create_test_service();
        seed_bar(&service).await;

        let mut unordered = ids(&service.descendants_of(IngredientId(2)).await.unwrap());
        unordered.sort();
        assert_eq!(unordered, vec![3, 4, 6]);

        let sorted = service
            .descendants_sorted_by_name(IngredientId(2))
            .await
            .unwrap();
        let names: Vec<&str> = sorted.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["Bourbon", "Rye", "Wheated"]);

        assert!(service.descendants_of(IngredientId(6)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_children_roots_and_subtree() {
        let (service, _store) = create_test_service();
        seed_bar(&service).await;

        let children = service.children_of(IngredientId(1)).await.unwrap();
        assert_eq!(ids(&children), vec![5, 2]); // Gin before Whiskey

        assert_eq!(ids(&service.roots().await.unwrap()), vec![1]);

        let tree = service.subtree(IngredientId(1)).await.unwrap().unwrap();
        assert_eq!(tree.node_count(), 6);
        assert_eq!(tree.children[0].node.name, "Gin");
        assert_eq!(tree.children[1].children.len(), 2);

        assert!(service.subtree(IngredientId(99)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_is_descendant_of_is_pure() {
        let (service, _store) = create_test_service();
        seed_bar(&service).await;

        let spirit = service.get_node(IngredientId(1)).await.unwrap().unwrap();
        let wheated = service.get_node(IngredientId(6)).await.unwrap().unwrap();
        let gin = service.get_node(IngredientId(5)).await.unwrap().unwrap();

        assert!(service.is_descendant_of(&wheated, &spirit));
        assert!(!service.is_descendant_of(&spirit, &wheated));
        assert!(!service.is_descendant_of(&wheated, &gin));
        assert!(!service.is_descendant_of(&spirit, &spirit));
    }

    #[tokio::test]
    async fn test_move_rewrites_whole_subtree() {
        let (service, store) = create_test_service();
        seed_bar(&service).await;

        let whiskey = service
            .move_node(IngredientId(2), Some(IngredientId(5)))
            .await
            .unwrap();

        assert_eq!(whiskey.parent_id, Some(IngredientId(5)));
        assert_eq!(path_of(&service, 2).await.as_deref(), Some(".1.5."));
        assert_eq!(path_of(&service, 3).await.as_deref(), Some(".1.5.2."));
        assert_eq!(path_of(&service, 4).await.as_deref(), Some(".1.5.2."));
        assert_eq!(path_of(&service, 6).await.as_deref(), Some(".1.5.2.3."));
        // Untouched sibling
        assert_eq!(path_of(&service, 5).await.as_deref(), Some(".1."));
        assert_consistent(&store).await;
    }

    #[tokio::test]
    async fn test_move_to_root_detaches_subtree() {
        let (service, store) = create_test_service();
        seed_bar(&service).await;

        let whiskey = service.move_node(IngredientId(2), None).await.unwrap();

        assert!(whiskey.is_root());
        assert_eq!(path_of(&service, 2).await, None);
        assert_eq!(path_of(&service, 3).await.as_deref(), Some(".2."));
        assert_eq!(path_of(&service, 6).await.as_deref(), Some(".2.3."));
        assert_eq!(
            ids(&service.descendants_of(IngredientId(1)).await.unwrap()),
            vec![5]
        );
        assert_consistent(&store).await;
    }

    #[tokio::test]
    async fn test_moving_a_root_rewrites_its_descendants() {
        let (service, store) = create_test_service();
        seed_bar(&service).await;
        let liquor = service.create_node(NewIngredient::new("Liquor")).await.unwrap();

        service.move_node(IngredientId(1), Some(liquor.id)).await.unwrap();

        assert_eq!(path_of(&service, 1).await.as_deref(), Some(".7."));
        assert_eq!(path_of(&service, 2).await.as_deref(), Some(".7.1."));
        assert_eq!(path_of(&service, 6).await.as_deref(), Some(".7.1.2.3."));
        assert_eq!(service.descendants_of(liquor.id).await.unwrap().len(), 6);
        assert_consistent(&store).await;
    }

    #[tokio::test]
    async fn test_move_into_own_subtree_is_rejected() {
        let (service, store) = create_test_service();
        seed_bar(&service).await;
        let before = store.snapshot().await;

        let err = service
            .move_node(IngredientId(2), Some(IngredientId(6)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HierarchyError::CyclicMove { node_id, new_parent_id }
                if node_id == IngredientId(2) && new_parent_id == IngredientId(6)
        ));

        let err = service
            .move_node(IngredientId(2), Some(IngredientId(2)))
            .await
            .unwrap_err();
        assert!(matches!(err, HierarchyError::CyclicMove { .. }));

        assert_eq!(store.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_move_unknown_nodes() {
        let (service, _store) = create_test_service();
        seed_bar(&service).await;

        let err = service.move_node(IngredientId(99), None).await.unwrap_err();
        assert!(matches!(err, HierarchyError::NodeNotFound { id } if id == IngredientId(99)));

        let err = service
            .move_node(IngredientId(2), Some(IngredientId(99)))
            .await
            .unwrap_err();
        assert!(matches!(err, HierarchyError::NodeNotFound { id } if id == IngredientId(99)));
    }

    #[tokio::test]
    async fn test_repeated_move_writes_nothing() {
        let (service, store) = create_test_service();
        seed_bar(&service).await;
        let mut events = service.subscribe_to_events();

        let writes = store.write_count();
        service
            .move_node(IngredientId(3), Some(IngredientId(2)))
            .await
            .unwrap();
        service.move_node(IngredientId(1), None).await.unwrap();

        assert_eq!(store.write_count(), writes);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_multi_digit_ids_are_not_confused() {
        let (service, store) = create_test_service();
        for i in 1..=123 {
            service
                .create_node(NewIngredient::new(format!("filler-{}", i)))
                .await
                .unwrap();
        }
        let under_12 = service
            .create_node(NewIngredient::new("under 12").with_parent(IngredientId(12)))
            .await
            .unwrap();
        let under_123 = service
            .create_node(NewIngredient::new("under 123").with_parent(IngredientId(123)))
            .await
            .unwrap();

        assert_eq!(
            ids(&service.descendants_of(IngredientId(12)).await.unwrap()),
            vec![under_12.id.0]
        );

        service
            .move_node(IngredientId(12), Some(IngredientId(1)))
            .await
            .unwrap();

        let untouched = service.get_node(under_123.id).await.unwrap().unwrap();
        assert_eq!(untouched.materialized_path.unwrap().as_str(), ".123.");
        assert_eq!(path_of(&service, under_12.id.0).await.as_deref(), Some(".1.12."));
        assert_consistent(&store).await;
    }

    #[tokio::test]
    async fn test_failed_move_rolls_back_every_write() {
        let (service, store) = create_test_service();
        seed_bar(&service).await;
        let before = store.snapshot().await;
        let mut events = service.subscribe_to_events();

        // Node itself plus one descendant succeed, the next write fails
        store.fail_after_writes(2);
        let err = service
            .move_node(IngredientId(2), Some(IngredientId(5)))
            .await
            .unwrap_err();
        store.clear_failures();

        assert!(matches!(err, HierarchyError::Persistence(_)));
        assert_eq!(store.snapshot().await, before);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_move_emits_event_after_commit() {
        let (service, _store) = create_test_service();
        seed_bar(&service).await;
        let mut events = service.subscribe_to_events();

        service
            .move_node(IngredientId(2), Some(IngredientId(5)))
            .await
            .unwrap();

        match events.try_recv().unwrap() {
            DomainEvent::NodeMoved { record } => {
                assert_eq!(record.node_id, IngredientId(2));
                assert_eq!(record.old_parent_id, Some(IngredientId(1)));
                assert_eq!(record.new_parent_id, Some(IngredientId(5)));
                assert_eq!(record.rewritten, 3);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_move_in_caller_transaction_is_not_committed() {
        let (service, store) = create_test_service();
        seed_bar(&service).await;
        let before = store.snapshot().await;

        let mut tx = store.begin().await.unwrap();
        let outcome = service
            .move_node_in(&mut tx, IngredientId(2), None)
            .await
            .unwrap();
        assert!(outcome.changed);
        assert_eq!(outcome.rewritten, 3);
        tx.rollback().await.unwrap();

        assert_eq!(store.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_strict_mode_rejects_non_transactional_handle() {
        let store = Arc::new(MemoryStore::new());
        let config = HierarchyConfig {
            strict_transactions: true,
            ..Default::default()
        };
        let service = HierarchyService::with_config(store.clone(), config);
        seed_bar(&service).await;
        let before = store.snapshot().await;

        let mut handle = store.direct().await;
        let err = service
            .move_node_in(&mut handle, IngredientId(2), None)
            .await
            .unwrap_err();
        drop(handle);

        assert!(matches!(err, HierarchyError::TransactionRequired { node_id } if node_id == IngredientId(2)));
        assert_eq!(store.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_lenient_mode_moves_through_direct_handle() {
        let (service, store) = create_test_service();
        seed_bar(&service).await;

        let warnings = Arc::new(Mutex::new(Vec::new()));
        let _subscriber = tracing::subscriber::set_default(
            tracing_subscriber::registry().with(WarningCapture(warnings.clone())),
        );

        let mut handle = store.direct().await;
        service
            .move_node_in(&mut handle, IngredientId(2), None)
            .await
            .unwrap();
        drop(handle);

        assert_eq!(path_of(&service, 6).await.as_deref(), Some(".2.3."));
        assert_consistent(&store).await;

        let warnings = warnings.lock().unwrap();
        assert_eq!(warnings.len(), 1, "{:?}", warnings);
        assert!(warnings[0].contains("outside a transaction"), "{}", warnings[0]);
    }

    #[tokio::test]
    async fn test_delete_reparents_children() {
        let (service, store) = create_test_service();
        seed_bar(&service).await;
        let mut events = service.subscribe_to_events();

        let result = service.delete_node(IngredientId(2)).await.unwrap();
        assert!(result.existed);
        assert_eq!(result.reparented, vec![IngredientId(3), IngredientId(4)]);

        assert!(service.get_node(IngredientId(2)).await.unwrap().is_none());
        assert_eq!(path_of(&service, 3).await.as_deref(), Some(".1."));
        assert_eq!(path_of(&service, 6).await.as_deref(), Some(".1.3."));
        assert_consistent(&store).await;

        // Two moves are not broadcast separately, only the delete
        assert!(matches!(
            events.try_recv().unwrap(),
            DomainEvent::NodeDeleted { id, .. } if id == IngredientId(2)
        ));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_delete_root_promotes_children() {
        let (service, store) = create_test_service();
        seed_bar(&service).await;

        service.delete_node(IngredientId(1)).await.unwrap();

        assert_eq!(ids(&service.roots().await.unwrap()), vec![5, 2]);
        assert_eq!(path_of(&service, 3).await.as_deref(), Some(".2."));
        assert_eq!(path_of(&service, 6).await.as_deref(), Some(".2.3."));
        assert_consistent(&store).await;
    }

    #[tokio::test]
    async fn test_delete_missing_node_is_noop() {
        let (service, store) = create_test_service();
        seed_bar(&service).await;
        let writes = store.write_count();

        let result = service.delete_node(IngredientId(99)).await.unwrap();

        assert!(!result.existed);
        assert!(result.reparented.is_empty());
        assert_eq!(store.write_count(), writes);
    }

    #[tokio::test]
    async fn test_attachment_cleanup_failure_does_not_fail_delete() {
        let store = Arc::new(MemoryStore::new());
        let mut cleaner = MockAttachmentCleaner::new();
        cleaner
            .expect_release()
            .withf(|id| *id == IngredientId(6))
            .times(1)
            .returning(|id| {
                Err(AttachmentError {
                    id,
                    reason: "image store offline".to_string(),
                })
            });
        let service =
            HierarchyService::new(store.clone()).with_attachment_cleaner(Arc::new(cleaner));
        seed_bar(&service).await;

        let result = service.delete_node(IngredientId(6)).await.unwrap();

        assert!(result.existed);
        assert_eq!(store.snapshot().await.len(), 5);
    }

    #[tokio::test]
    async fn test_update_keeps_hierarchy() {
        let (service, _store) = create_test_service();
        seed_bar(&service).await;
        let mut events = service.subscribe_to_events();

        let update = IngredientUpdate {
            name: Some("Bourbon Whiskey".to_string()),
            strength: Some(Some(45.0)),
            ..Default::default()
        };
        let updated = service.update_node(IngredientId(3), update).await.unwrap();

        assert_eq!(updated.name, "Bourbon Whiskey");
        assert_eq!(updated.strength, Some(45.0));
        assert_eq!(path_of(&service, 3).await.as_deref(), Some(".1.2."));
        assert!(matches!(events.try_recv().unwrap(), DomainEvent::NodeUpdated { .. }));

        let invalid = IngredientUpdate {
            name: Some(" ".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            service.update_node(IngredientId(3), invalid).await.unwrap_err(),
            HierarchyError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_empty_update_writes_and_emits_nothing() {
        let (service, store) = create_test_service();
        seed_bar(&service).await;
        let mut events = service.subscribe_to_events();
        let writes = store.write_count();

        let node = service
            .update_node(IngredientId(3), IngredientUpdate::default())
            .await
            .unwrap();

        assert_eq!(node.name, "Bourbon");
        assert_eq!(store.write_count(), writes);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_rebuild_repairs_stale_paths() {
        let (service, store) = create_test_service();
        seed_bar(&service).await;

        let mut wheated = service.get_node(IngredientId(6)).await.unwrap().unwrap();
        wheated.materialized_path = Some(MaterializedPath::parse(".9.9.").unwrap());
        store.put_raw(wheated).await;

        let report = service.rebuild_subtree(IngredientId(1)).await.unwrap();
        assert_eq!(report.visited, 5);
        assert_eq!(report.rewritten, 1);
        assert_eq!(path_of(&service, 6).await.as_deref(), Some(".1.2.3."));
        assert_consistent(&store).await;

        // A consistent tree is left alone
        let writes = store.write_count();
        let report = service.rebuild_subtree(IngredientId(1)).await.unwrap();
        assert_eq!(report.rewritten, 0);
        assert_eq!(store.write_count(), writes);
    }

    #[tokio::test]
    async fn test_rebuild_all_resets_stale_root_path() {
        let (service, store) = create_test_service();
        seed_bar(&service).await;

        let mut spirit = service.get_node(IngredientId(1)).await.unwrap().unwrap();
        spirit.materialized_path = Some(MaterializedPath::parse(".42.").unwrap());
        store.put_raw(spirit).await;

        let report = service.rebuild_all().await.unwrap();

        assert_eq!(report.visited, 6);
        assert_eq!(report.rewritten, 1);
        assert_eq!(path_of(&service, 1).await, None);
        assert_consistent(&store).await;
    }

    #[tokio::test]
    async fn test_rebuild_stops_at_max_depth() {
        let store = Arc::new(MemoryStore::new());
        let config = HierarchyConfig {
            max_depth: 2,
            ..Default::default()
        };
        let service = HierarchyService::with_config(store.clone(), config);
        seed_bar(&service).await;

        let err = service.rebuild_subtree(IngredientId(1)).await.unwrap_err();
        assert!(matches!(err, HierarchyError::HierarchyViolation(_)));

        // Depth 2 below Whiskey is fine
        assert!(service.rebuild_subtree(IngredientId(2)).await.is_ok());
    }

    #[tokio::test]
    async fn test_broken_path_reference_is_reported() {
        let (service, store) = create_test_service();
        seed_bar(&service).await;

        let mut wheated = service.get_node(IngredientId(6)).await.unwrap().unwrap();
        wheated.materialized_path = Some(MaterializedPath::parse(".1.99.3.").unwrap());
        store.put_raw(wheated).await;

        let err = service.ancestors_of(IngredientId(6)).await.unwrap_err();
        assert!(matches!(
            err,
            HierarchyError::BrokenPathReference { node_id, missing_id }
                if node_id == IngredientId(6) && missing_id == IngredientId(99)
        ));
    }
}
