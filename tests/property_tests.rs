/// Property-based tests using proptest
/// Tests invariants that should hold for all inputs
use proptest::prelude::*;

use rust_estate_client::compare::{AddOutcome, CompareStore};
use rust_estate_client::filters::{
    parse_filters, FilterSet, Finishing, ListingStatus, SortOrder, DEFAULT_LIMIT, DEFAULT_PAGE,
};
use rust_estate_client::storage::MemoryStore;

fn text_value() -> impl Strategy<Value = Option<String>> {
    proptest::option::of("[a-zA-Z0-9][a-zA-Z0-9 ]{0,11}")
}

fn tag_list() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec("[a-z]{1,8}", 0..3).prop_map(|mut tags| {
        tags.sort();
        tags.dedup();
        tags
    })
}

fn finishing_value() -> impl Strategy<Value = Option<Finishing>> {
    proptest::option::of(prop::sample::select(vec![
        Finishing::Finished,
        Finishing::SemiFinished,
        Finishing::CoreAndShell,
        Finishing::FullyFurnished,
    ]))
}

fn status_value() -> impl Strategy<Value = Option<ListingStatus>> {
    proptest::option::of(prop::sample::select(vec![
        ListingStatus::Available,
        ListingStatus::Reserved,
        ListingStatus::Sold,
    ]))
}

fn sort_value() -> impl Strategy<Value = Option<SortOrder>> {
    proptest::option::of(prop::sample::select(vec![
        SortOrder::Newest,
        SortOrder::PriceAsc,
        SortOrder::PriceDesc,
        SortOrder::AreaAsc,
        SortOrder::AreaDesc,
    ]))
}

prop_compose! {
    fn filter_set()(
        (search, city, area) in (text_value(), text_value(), text_value()),
        (min_price, max_price) in (
            proptest::option::of(100_000u64..50_000_000),
            proptest::option::of(100_000u64..50_000_000),
        ),
        (min_area, max_area) in (
            proptest::option::of(30u32..1000),
            proptest::option::of(30u32..1000),
        ),
        (bedrooms, bathrooms) in (
            proptest::option::of(1u8..=10),
            proptest::option::of(1u8..=10),
        ),
        finishing in finishing_value(),
        tags in tag_list(),
        status in status_value(),
        sort in sort_value(),
        page in 1u32..=50,
        limit in 1u32..=48,
    ) -> FilterSet {
        FilterSet {
            search,
            city,
            area,
            min_price,
            max_price,
            min_area,
            max_area,
            bedrooms,
            bathrooms,
            finishing,
            tags,
            status,
            sort,
            page,
            limit,
        }
    }
}

// Property: the query string encoding round-trips every valid filter set
proptest! {
    #[test]
    fn filter_roundtrip_through_query_string(filters in filter_set()) {
        let query = filters.to_query_string();
        let parsed = parse_filters(&query);
        prop_assert_eq!(parsed, filters);
    }

    #[test]
    fn unknown_keys_never_leak_into_the_set(
        filters in filter_set(),
        junk_key in "[a-z_]{3,12}",
        junk_value in "[a-zA-Z0-9]{1,10}",
    ) {
        // Skip the rare collision with a whitelisted key.
        prop_assume!(!matches!(
            junk_key.as_str(),
            "search" | "city" | "area" | "min_price" | "max_price" | "min_area"
                | "max_area" | "bedrooms" | "bathrooms" | "finishing" | "tags"
                | "status" | "sort" | "page" | "limit"
        ));

        let query = filters.to_query_string();
        let polluted = if query.is_empty() {
            format!("{}={}", junk_key, junk_value)
        } else {
            format!("{}&{}={}", query, junk_key, junk_value)
        };
        prop_assert_eq!(parse_filters(&polluted), filters);
    }
}

// Property: parsing never panics and bad values degrade to unset
proptest! {
    #[test]
    fn parse_never_panics(query in "\\PC*") {
        let _ = parse_filters(&query);
    }

    #[test]
    fn non_numeric_values_leave_numeric_fields_unset(garbage in "[a-zA-Z!@# ]{1,10}") {
        let query = format!("min_price={}&bedrooms={}", garbage, garbage);
        let filters = parse_filters(&query);
        prop_assert!(filters.min_price.is_none());
        prop_assert!(filters.bedrooms.is_none());
        prop_assert_eq!(filters.page, DEFAULT_PAGE);
        prop_assert_eq!(filters.limit, DEFAULT_LIMIT);
    }
}

// Property: compare outcomes are total and the bound holds under any sequence
proptest! {
    #[test]
    fn compare_never_exceeds_limit(ids in proptest::collection::vec("[a-z0-9]{1,6}", 1..20)) {
        let store = CompareStore::new(std::sync::Arc::new(MemoryStore::new()));
        for id in &ids {
            let selected_before = store.is_selected(id);
            let full_before = store.is_full();
            match store.add(id) {
                AddOutcome::Duplicate => prop_assert!(selected_before),
                AddOutcome::LimitReached => {
                    prop_assert!(full_before);
                    prop_assert!(!selected_before);
                }
                AddOutcome::Added => {
                    prop_assert!(!selected_before);
                    prop_assert!(!full_before);
                }
            }
            prop_assert!(store.ids().len() <= 2);
        }
    }
}
