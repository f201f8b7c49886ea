// tests/allocation_properties.rs

use std::collections::HashSet;

use hpcexec::alloc::{Architecture, Service};
use hpcexec::types::PoolPolicy;
use proptest::prelude::*;

const COLORS: [&str; 4] = ["RED", "BLUE", "GREEN", "YELLOW"];

// Each service picks a non-empty subset of the palette with a count per
// color. Colors may be shared between services.
fn shared_arch_strategy() -> impl Strategy<Value = Architecture> {
    proptest::collection::vec(
        proptest::collection::vec(0..6usize, COLORS.len()),
        1..6,
    )
    .prop_filter_map("every service needs at least one color", |raw| {
        let mut services = Vec::new();
        for (i, counts) in raw.into_iter().enumerate() {
            let parts: Vec<String> = counts
                .iter()
                .zip(COLORS)
                .filter(|(n, _)| **n > 0)
                .map(|(n, c)| format!("{c}:{n}"))
                .collect();
            if parts.is_empty() {
                return None;
            }
            let total: usize = counts.iter().sum();
            services.push(Service::new(format!("svc{i}"), total, &parts.join("+")).ok()?);
        }
        Architecture::from_services(services).ok()
    })
}

// Every service gets colors of its own, so exclusive pools never overflow.
fn private_colors_strategy() -> impl Strategy<Value = Architecture> {
    proptest::collection::vec(proptest::collection::vec(1..5usize, 1..4), 1..6).prop_map(|raw| {
        let services = raw.into_iter().enumerate().map(|(i, counts)| {
            let dist = counts
                .iter()
                .enumerate()
                .map(|(j, n)| format!("C{i}_{j}:{n}"))
                .collect::<Vec<_>>()
                .join("+");
            Service::new(format!("svc{i}"), counts.iter().sum(), &dist).unwrap()
        });
        Architecture::from_services(services).unwrap()
    })
}

fn node_list(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("n{i}")).collect()
}

fn check_postconditions(arch: &Architecture) {
    let pools = arch.pools().expect("scheduled");

    // Pools never intersect.
    let mut seen = HashSet::new();
    for pool in pools {
        for node in &pool.nodes {
            assert!(seen.insert(node.clone()), "{node} is in two pools");
        }
    }

    for service in arch.services() {
        // Every service receives exactly what it asked for.
        assert_eq!(service.assigned_nodes().len(), service.num_nodes());
        assert_eq!(service.hostfile().map(|h| h.len()), Some(service.num_nodes()));
    }

    // A color's assignments stay inside its pool.
    for pool in pools {
        let members: HashSet<&String> = pool.nodes.iter().collect();
        for service in arch.services() {
            let mut offset = 0;
            for (color, count) in service.distribution() {
                if *color == pool.color {
                    for node in &service.assigned_nodes()[offset..offset + count] {
                        assert!(members.contains(node), "{node} is outside pool {color}");
                    }
                }
                offset += count;
            }
        }
    }
}

proptest! {
    #[test]
    fn colocated_assignment_holds_postconditions(mut arch in shared_arch_strategy()) {
        let demand = arch.num_nodes_needed();
        arch.assign(node_list(demand), PoolPolicy::Colocated).unwrap();
        check_postconditions(&arch);
    }

    #[test]
    fn exclusive_assignment_holds_postconditions(mut arch in private_colors_strategy()) {
        let demand = arch.num_nodes_needed();
        arch.assign(node_list(demand), PoolPolicy::Exclusive).unwrap();
        check_postconditions(&arch);

        // With private colors every node is used exactly once.
        let assigned: Vec<&String> = arch
            .services()
            .flat_map(|s| s.assigned_nodes().iter())
            .collect();
        let unique: HashSet<&String> = assigned.iter().copied().collect();
        prop_assert_eq!(assigned.len(), demand);
        prop_assert_eq!(unique.len(), demand);
    }

    #[test]
    fn demand_is_sum_of_per_color_maxima(arch in shared_arch_strategy()) {
        let mut expected = 0;
        for color in COLORS {
            expected += arch
                .services()
                .filter_map(|s| s.count_for(color))
                .max()
                .unwrap_or(0);
        }
        prop_assert_eq!(arch.num_nodes_needed(), expected);
    }

    #[test]
    fn exclusive_validation_matches_pool_sums(arch in shared_arch_strategy()) {
        let overflow = COLORS.iter().any(|color| {
            let counts: Vec<usize> = arch.services().filter_map(|s| s.count_for(color)).collect();
            counts.iter().sum::<usize>() > counts.iter().copied().max().unwrap_or(0)
        });
        prop_assert_eq!(arch.validate_pools(PoolPolicy::Exclusive).is_err(), overflow);
    }
}
