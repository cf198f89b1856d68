//! Planner Module Tests
//!
//! ## Test Scopes
//! - **Coverage**: Every key lands in exactly one partition for range and hash plans.
//! - **Sizing**: Remainder distribution, small ranges and the partition cap.
//! - **Selection**: No workers, non-splittable queries and round-robin assignment.

#[cfg(test)]
mod tests {
    use crate::error::DispatchError;
    use crate::planner::partitioner::split_range;
    use crate::planner::{PartitionPlan, PartitionPlanner, PartitionPredicate, SplitStrategy};
    use crate::query::parse_query;
    use crate::query::types::KeyRange;
    use crate::registry::Worker;
    use uuid::Uuid;

    fn workers(n: usize) -> Vec<Worker> {
        (1..=n)
            .map(|i| Worker::new(format!("w{}", i), format!("http://w{}:8001", i)))
            .collect()
    }

    fn plan(sql: &str, worker_count: usize) -> PartitionPlan {
        let query = parse_query(sql, "id").unwrap();
        PartitionPlanner::new(None)
            .plan(Uuid::new_v4(), &query, &workers(worker_count))
            .unwrap()
    }

    fn assert_exact_cover(plan: &PartitionPlan, keys: impl Iterator<Item = Option<i64>>) {
        for key in keys {
            let owners = plan
                .sub_queries
                .iter()
                .filter(|sq| sq.predicate.contains(key))
                .count();
            assert_eq!(owners, 1, "key {:?} is covered {} times", key, owners);
        }
    }

    // ============================================================
    // COVERAGE TESTS
    // ============================================================

    #[test]
    fn test_range_plan_covers_every_key_once() {
        let plan = plan(
            "SELECT COUNT(*) FROM numbers WHERE id BETWEEN 1 AND 1000",
            4,
        );

        assert_eq!(plan.strategy, SplitStrategy::Range);
        assert_eq!(plan.sub_queries.len(), 4);
        assert_exact_cover(&plan, (1..=1000).map(Some));
    }

    #[test]
    fn test_hash_plan_covers_every_key_once_including_negatives_and_null() {
        let plan = plan("SELECT v, COUNT(*) FROM numbers GROUP BY v", 3);

        assert_eq!(plan.strategy, SplitStrategy::Hash);
        assert_eq!(plan.sub_queries.len(), 3);
        assert_exact_cover(&plan, (-50..50).map(Some).chain(std::iter::once(None)));
    }

    #[test]
    fn test_range_sub_query_sql_keeps_original_filter() {
        let plan = plan(
            "SELECT id FROM numbers WHERE id > 1000 AND id <= 2000 ORDER BY id",
            2,
        );

        assert_eq!(
            plan.sub_queries[0].sql,
            "SELECT id AS _p0 FROM numbers WHERE (id > 1000 AND id <= 2000) \
             AND id BETWEEN 1001 AND 1500 ORDER BY _p0 ASC"
        );
        assert_eq!(
            plan.sub_queries[1].predicate,
            PartitionPredicate::Range {
                column: "id".to_string(),
                start: 1501,
                end: 2000
            }
        );
    }

    #[test]
    fn test_hash_predicate_sql() {
        let plan = plan("SELECT id FROM numbers ORDER BY id", 2);

        assert_eq!(
            plan.sub_queries[0].predicate.to_sql().unwrap(),
            "(((id % 2) + 2) % 2 = 0 OR id IS NULL)"
        );
        assert_eq!(
            plan.sub_queries[1].predicate.to_sql().unwrap(),
            "((id % 2) + 2) % 2 = 1"
        );
    }

    #[test]
    fn test_join_uses_qualified_split_key() {
        let plan = plan(
            "SELECT n.id FROM numbers n JOIN other o ON n.id = o.id",
            2,
        );

        assert!(plan.sub_queries[1].sql.contains("((n.id % 2) + 2) % 2 = 1"));
    }

    // ============================================================
    // SIZING TESTS
    // ============================================================

    #[test]
    fn test_remainder_goes_to_first_partitions() {
        let ranges = split_range(KeyRange { low: 1, high: 10 }, 3);
        let sizes: Vec<i64> = ranges.iter().map(|(s, e)| e - s + 1).collect();

        assert_eq!(sizes, vec![4, 3, 3]);
        assert_eq!(ranges, vec![(1, 4), (5, 7), (8, 10)]);
    }

    #[test]
    fn test_range_smaller_than_worker_count() {
        let plan = plan("SELECT * FROM numbers WHERE id >= 5 AND id <= 6", 4);

        assert_eq!(plan.strategy, SplitStrategy::Range);
        assert_eq!(plan.sub_queries.len(), 2);
        assert_exact_cover(&plan, (5..=6).map(Some));
    }

    #[test]
    fn test_extreme_range_does_not_overflow() {
        let ranges = split_range(
            KeyRange {
                low: i64::MIN,
                high: i64::MAX,
            },
            3,
        );

        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[0].0, i64::MIN);
        assert_eq!(ranges[2].1, i64::MAX);
        assert_eq!(ranges[0].1 + 1, ranges[1].0);
    }

    #[test]
    fn test_max_partitions_caps_fan_out() {
        let query = parse_query("SELECT v, COUNT(*) FROM numbers GROUP BY v", "id").unwrap();
        let planner = PartitionPlanner::new(Some(2));

        let plan = planner.plan(Uuid::new_v4(), &query, &workers(5)).unwrap();
        assert_eq!(plan.sub_queries.len(), 2);
        assert_exact_cover(&plan, (0..100).map(Some));
    }

    // ============================================================
    // SELECTION TESTS
    // ============================================================

    #[test]
    fn test_no_workers_fails_before_dispatch() {
        let query = parse_query("SELECT COUNT(*) FROM numbers", "id").unwrap();
        let result = PartitionPlanner::new(None).plan(Uuid::new_v4(), &query, &[]);

        assert_eq!(result.unwrap_err(), DispatchError::NoWorkersAvailable);
    }

    #[test]
    fn test_non_splittable_query_gets_one_sub_query() {
        let plan = plan("SELECT COUNT(*) FROM numbers WHERE v > 10", 4);

        assert_eq!(plan.strategy, SplitStrategy::Single);
        assert_eq!(plan.sub_queries.len(), 1);
        assert_eq!(plan.sub_queries[0].predicate, PartitionPredicate::All);
        assert!(!plan.is_split());
    }

    #[test]
    fn test_single_plans_rotate_across_workers() {
        let query = parse_query("SELECT id FROM numbers", "id").unwrap();
        let planner = PartitionPlanner::new(None);
        let pool = workers(3);

        let assigned: Vec<String> = (0..4)
            .map(|_| {
                planner.plan(Uuid::new_v4(), &query, &pool).unwrap().sub_queries[0]
                    .worker
                    .name
                    .clone()
            })
            .collect();

        assert_eq!(assigned, vec!["w1", "w2", "w3", "w1"]);
    }

    #[test]
    fn test_single_worker_never_splits() {
        let plan = plan("SELECT v, COUNT(*) FROM numbers GROUP BY v", 1);
        assert_eq!(plan.strategy, SplitStrategy::Single);
    }
}
