//! Tests for ShelfService
//!
//! Membership and unit conversion are mocked; the hierarchy side runs
//! against a real in-memory store.

#[cfg(test)]
mod tests {
    use crate::db::MemoryStore;
    use crate::models::{IngredientId, IngredientPrice, NewIngredient, Unit};
    use crate::services::collaborators::{
        ConversionError, MembershipError, MembershipScope, MockMembershipSource,
        MockUnitConverter,
    };
    use crate::services::{HierarchyError, HierarchyService, ShelfService};
    use std::collections::HashSet;
    use std::sync::Arc;

    const BAR: MembershipScope = MembershipScope::Shelf(7);

    /// Whiskey(1) > { Scotch(2) > Islay(3), Bourbon(4), Rye(5) }, Gin(6)
    async fn seed_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let hierarchy = HierarchyService::new(store.clone());

        let whiskey = hierarchy.create_node(NewIngredient::new("Whiskey")).await.unwrap();
        let scotch = hierarchy
            .create_node(NewIngredient::new("Scotch").with_parent(whiskey.id))
            .await
            .unwrap();
        hierarchy
            .create_node(NewIngredient::new("Islay").with_parent(scotch.id))
            .await
            .unwrap();
        for name in ["Bourbon", "Rye"] {
            hierarchy
                .create_node(NewIngredient::new(name).with_parent(whiskey.id))
                .await
                .unwrap();
        }
        hierarchy.create_node(NewIngredient::new("Gin")).await.unwrap();
        store
    }

    fn stocked(ids: &[i64]) -> MockMembershipSource {
        let set: HashSet<IngredientId> = ids.iter().copied().map(IngredientId).collect();
        let mut membership = MockMembershipSource::new();
        membership
            .expect_membership_ids()
            .returning(move |_| Ok(set.clone()));
        membership
    }

    fn shelf(store: Arc<MemoryStore>, membership: MockMembershipSource) -> ShelfService<MemoryStore> {
        ShelfService::new(store, Arc::new(membership), Arc::new(MockUnitConverter::new()))
    }

    #[tokio::test]
    async fn test_has_stocked_variant() {
        let store = seed_store().await;

        let service = shelf(store.clone(), stocked(&[3, 6]));
        assert!(service.has_stocked_variant(IngredientId(1), BAR).await.unwrap());
        assert!(service.has_stocked_variant(IngredientId(2), BAR).await.unwrap());
        assert!(!service.has_stocked_variant(IngredientId(4), BAR).await.unwrap());

        // The category itself counts
        assert!(service.has_stocked_variant(IngredientId(6), BAR).await.unwrap());
    }

    #[tokio::test]
    async fn test_shelf_variants_sorted_by_name() {
        let store = seed_store().await;
        let service = shelf(store, stocked(&[1, 5, 3, 4, 6]));

        let variants = service.shelf_variants(IngredientId(1), BAR).await.unwrap();
        let names: Vec<&str> = variants.iter().map(|n| n.name.as_str()).collect();

        // Whiskey itself and Gin are excluded
        assert_eq!(names, vec!["Bourbon", "Islay", "Rye"]);
    }

    #[tokio::test]
    async fn test_variants_lists_whole_subtree() {
        let store = seed_store().await;
        let service = shelf(store, MockMembershipSource::new());

        let variants = service.variants(IngredientId(1)).await.unwrap();
        let names: Vec<&str> = variants.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["Bourbon", "Islay", "Rye", "Scotch"]);
    }

    #[tokio::test]
    async fn test_unknown_category() {
        let store = seed_store().await;
        let service = shelf(store, stocked(&[]));

        let err = service
            .has_stocked_variant(IngredientId(99), BAR)
            .await
            .unwrap_err();
        assert!(matches!(err, HierarchyError::NodeNotFound { .. }));
    }

    #[tokio::test]
    async fn test_membership_failure_is_reported() {
        let store = seed_store().await;
        let mut membership = MockMembershipSource::new();
        membership
            .expect_membership_ids()
            .returning(|_| Err(MembershipError("timeout".to_string())));
        let service = shelf(store, membership);

        let err = service
            .shelf_variants(IngredientId(1), MembershipScope::ShoppingList(3))
            .await
            .unwrap_err();
        assert!(matches!(err, HierarchyError::MembershipUnavailable(_)));
    }

    fn bottle() -> IngredientPrice {
        IngredientPrice {
            ingredient_id: IngredientId(4),
            price: 3000,
            currency: "EUR".to_string(),
            amount: 70.0,
            unit: Unit::Cl,
        }
    }

    #[tokio::test]
    async fn test_price_in_converts_amount() {
        let store = seed_store().await;
        let mut converter = MockUnitConverter::new();
        converter
            .expect_convert()
            .withf(|amount, from, to| *amount == 70.0 && *from == Unit::Cl && *to == Unit::Ml)
            .times(1)
            .returning(|amount, _, _| Ok(amount * 10.0));
        let service = ShelfService::new(
            store,
            Arc::new(MockMembershipSource::new()),
            Arc::new(converter),
        );

        let converted = service.price_in(&bottle(), &Unit::Ml).unwrap();
        assert_eq!(converted.amount, 700.0);
        assert_eq!(converted.unit, Unit::Ml);
        assert_eq!(converted.price, 3000);

        // Same unit needs no converter call
        assert_eq!(service.price_in(&bottle(), &Unit::Cl).unwrap(), bottle());
    }

    #[tokio::test]
    async fn test_price_in_propagates_unsupported_conversion() {
        let store = seed_store().await;
        let mut converter = MockUnitConverter::new();
        converter.expect_convert().returning(|_, from, to| {
            Err(ConversionError::UnsupportedConversion {
                from: from.clone(),
                to: to.clone(),
            })
        });
        let service = ShelfService::new(
            store,
            Arc::new(MockMembershipSource::new()),
            Arc::new(converter),
        );

        let err = service.price_in(&bottle(), &Unit::Dash).unwrap_err();
        assert!(matches!(
            err,
            HierarchyError::Conversion(ConversionError::UnsupportedConversion { .. })
        ));
    }
}
