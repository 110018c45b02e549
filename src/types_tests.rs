//! Tests for core types

#[cfg(test)]
mod tests {
    use super::super::types::*;

    #[test]
    fn direction_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Direction::Bullish).unwrap(), "\"bullish\"");
        assert_eq!(serde_json::to_string(&Direction::Bearish).unwrap(), "\"bearish\"");
        let parsed: Direction = serde_json::from_str("\"neutral\"").unwrap();
        assert_eq!(parsed, Direction::Neutral);
    }

    #[test]
    fn direction_inversion() {
        assert_eq!(Direction::Bullish.inverted(), Direction::Bearish);
        assert_eq!(Direction::Bearish.inverted(), Direction::Bullish);
        assert_eq!(Direction::Neutral.inverted(), Direction::Neutral);
    }

    #[test]
    fn status_enums_match_their_stored_strings() {
        assert_eq!(PredictionStatus::Active.as_str(), "active");
        assert_eq!(PredictionStatus::Resolved.as_str(), "resolved");
        assert_eq!(PredictionStatus::Expired.as_str(), "expired");
        assert_eq!(AlertStatus::Acknowledged.as_str(), "acknowledged");
        assert_eq!(ScopeLevel::Runner.as_str(), "runner");
        assert_eq!(Direction::Bullish.as_str(), "bullish");
    }

    #[test]
    fn injection_tables_use_kebab_case() {
        assert_eq!(
            serde_json::to_string(&InjectionTable::PriceData).unwrap(),
            "\"price-data\""
        );
        let parsed: InjectionTable = serde_json::from_str("\"articles\"").unwrap();
        assert_eq!(parsed, InjectionTable::Articles);
        assert_eq!(InjectionTable::ALL.len(), 4);
    }

    #[test]
    fn pipeline_tiers_use_kebab_case() {
        assert_eq!(
            serde_json::to_string(&PipelineTier::SignalDetection).unwrap(),
            "\"signal-detection\""
        );
        let parsed: PipelineTier = serde_json::from_str("\"prediction-generation\"").unwrap();
        assert_eq!(parsed, PipelineTier::PredictionGeneration);
    }

    #[test]
    fn page_request_offsets_are_one_based() {
        let first = PageRequest::default();
        assert_eq!(first.page, 1);
        assert_eq!(first.page_size, 50);
        assert_eq!(first.offset(), 0);

        let third = PageRequest {
            page: 3,
            page_size: 20,
        };
        assert_eq!(third.offset(), 40);

        // Page 0 clamps rather than underflowing.
        let zero = PageRequest {
            page: 0,
            page_size: 20,
        };
        assert_eq!(zero.offset(), 0);
    }

    #[test]
    fn page_request_decodes_with_defaults() {
        let req: PageRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.page, 1);
        assert_eq!(req.page_size, 50);

        let req: PageRequest = serde_json::from_str("{\"page\": 2}").unwrap();
        assert_eq!(req.page, 2);
        assert_eq!(req.page_size, 50);
    }

    #[test]
    fn paginated_carries_the_request_metadata() {
        let page = Paginated::new(
            vec![1, 2, 3],
            PageRequest {
                page: 2,
                page_size: 3,
            },
            10,
        );
        assert_eq!(page.metadata.page, 2);
        assert_eq!(page.metadata.total_count, 10);
        assert_eq!(page.data.len(), 3);
    }

    #[test]
    fn test_symbols_are_prefix_marked() {
        assert!(is_test_symbol("T_ACME"));
        assert!(!is_test_symbol("ACME"));
        assert!(!is_test_symbol("t_acme"));
        assert!(!is_test_symbol(""));
    }

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(new_id(), new_id());
    }

    #[test]
    fn crawl_frequencies_are_sorted_minutes() {
        assert_eq!(CRAWL_FREQUENCIES, [5, 10, 15, 30, 60]);
    }
}
