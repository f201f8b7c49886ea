// tests/allocation.rs

mod common;
use crate::common::init_tracing;

use hpcexec::alloc::{AllocationOptions, Architecture, Service};
use hpcexec::errors::HpcExecError;
use hpcexec::types::PoolPolicy;
use hpcexec_test_utils::fake_allocator::FakeAllocator;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn canonical() -> Architecture {
    Architecture::from_services([
        Service::new("client", 16, "RED:16").unwrap(),
        Service::new("server", 16, "BLUE:16").unwrap(),
        Service::new("app", 16, "RED:4+BLUE:4+GREEN:8").unwrap(),
    ])
    .unwrap()
}

fn nodes(range: std::ops::RangeInclusive<usize>) -> Vec<String> {
    range.map(|i| format!("node-{i:03}")).collect()
}

fn colocated() -> AllocationOptions {
    AllocationOptions {
        policy: PoolPolicy::Colocated,
        ..AllocationOptions::default()
    }
}

#[test]
fn demand_is_the_per_color_maximum() {
    let arch = canonical();

    assert_eq!(
        arch.color_demand(),
        vec![
            ("RED".to_string(), 16),
            ("BLUE".to_string(), 16),
            ("GREEN".to_string(), 8),
        ]
    );
    assert_eq!(arch.num_nodes_needed(), 40);
}

#[tokio::test]
async fn exclusive_policy_rejects_an_oversubscribed_color_before_allocating() {
    init_tracing();
    let mut arch = canonical();
    let mut backend = FakeAllocator::new();
    let log = backend.log();

    let result = arch
        .schedule(&mut backend, &AllocationOptions::default())
        .await;

    match result {
        Err(HpcExecError::PoolOverflow {
            color,
            requested,
            capacity,
        }) => {
            assert_eq!(color, "RED");
            assert_eq!(requested, 20);
            assert_eq!(capacity, 16);
        }
        other => panic!("expected PoolOverflow, got {other:?}"),
    }
    assert!(log.lock().unwrap().requests.is_empty());
    assert!(!arch.is_scheduled());
}

#[tokio::test]
async fn colocated_policy_shares_pool_prefixes() -> TestResult {
    init_tracing();
    let mut arch = canonical();
    let mut backend = FakeAllocator::new();
    let log = backend.log();

    arch.schedule(&mut backend, &colocated()).await?;

    assert_eq!(log.lock().unwrap().requests[0].nodes, 40);

    let pools = arch.pools().unwrap();
    assert_eq!(pools.len(), 3);
    assert_eq!(pools[0].color, "RED");
    assert_eq!(pools[0].nodes, nodes(1..=16));
    assert_eq!(pools[1].nodes, nodes(17..=32));
    assert_eq!(pools[2].nodes, nodes(33..=40));

    assert_eq!(arch.hostfile("client")?.hosts(), nodes(1..=16).as_slice());
    assert_eq!(arch.hostfile("server")?.hosts(), nodes(17..=32).as_slice());

    let mut app = nodes(1..=4);
    app.extend(nodes(17..=20));
    app.extend(nodes(33..=40));
    assert_eq!(arch.service("app")?.assigned_nodes(), app.as_slice());
    Ok(())
}

#[tokio::test]
async fn exclusive_policy_advances_the_pool_cursor() -> TestResult {
    init_tracing();
    let mut arch = Architecture::new();
    arch.add("a", 4, "RED:2+BLUE:2")?;
    arch.add("b", 3, "GREEN")?;
    let mut backend = FakeAllocator::new();

    arch.schedule(&mut backend, &AllocationOptions::default())
        .await?;

    assert_eq!(arch.hostfile("a")?.hosts(), nodes(1..=4).as_slice());
    assert_eq!(arch.hostfile("b")?.hosts(), nodes(5..=7).as_slice());
    Ok(())
}

#[test]
fn exclusive_assignment_never_hands_out_a_node_twice() -> TestResult {
    let mut arch = Architecture::new();
    arch.add("a", 2, "RED")?;
    arch.add("b", 5, "BLUE:3+GREEN:2")?;
    arch.add("c", 1, "YELLOW:1")?;

    arch.assign(nodes(1..=8), PoolPolicy::Exclusive)?;

    let mut all: Vec<&String> = arch
        .services()
        .flat_map(|s| s.assigned_nodes().iter())
        .collect();
    let total = all.len();
    all.sort();
    all.dedup();
    assert_eq!(total, 8);
    assert_eq!(all.len(), 8);
    Ok(())
}

#[test]
fn extra_nodes_beyond_demand_are_left_unused() -> TestResult {
    let mut arch = Architecture::new();
    arch.add("only", 2, "RED")?;

    arch.assign(nodes(1..=5), PoolPolicy::Exclusive)?;

    assert_eq!(arch.hostfile("only")?.hosts(), nodes(1..=2).as_slice());
    Ok(())
}

#[tokio::test]
async fn short_allocation_is_surfaced_and_released() {
    init_tracing();
    let mut arch = canonical();
    let mut backend = FakeAllocator::new().short_by(1);
    let log = backend.log();

    let result = arch.schedule(&mut backend, &colocated()).await;

    assert!(matches!(
        result,
        Err(HpcExecError::AllocationShortfall {
            requested: 40,
            received: 39
        })
    ));
    assert_eq!(log.lock().unwrap().releases, 1);
    assert!(!arch.is_scheduled());
}

#[tokio::test]
async fn allocator_failure_propagates() {
    init_tracing();
    let mut arch = canonical();
    let mut backend = FakeAllocator::new().failing("no capacity");

    let result = arch.schedule(&mut backend, &colocated()).await;
    match result {
        Err(HpcExecError::AllocatorError(msg)) => assert_eq!(msg, "no capacity"),
        other => panic!("expected AllocatorError, got {other:?}"),
    }
}

#[tokio::test]
async fn allocator_failing_after_acquiring_is_released() {
    init_tracing();
    let mut arch = canonical();
    let mut backend = FakeAllocator::new().failing_after_acquire("squeue failed");
    let log = backend.log();

    let result = arch.schedule(&mut backend, &colocated()).await;

    assert!(matches!(result, Err(HpcExecError::AllocatorError(_))));
    let log = log.lock().unwrap();
    assert_eq!(log.releases, 1);
    assert!(!log.held, "allocation is still held");
    assert!(!arch.is_scheduled());
}

#[tokio::test]
async fn request_carries_placement_hints() -> TestResult {
    init_tracing();
    let mut arch = Architecture::new();
    arch.add("svc", 4, "RED")?;
    let mut backend = FakeAllocator::new();
    let log = backend.log();

    let options = AllocationOptions {
        partition: Some("compute".to_string()),
        node_list: Some("node-[001-002]".to_string()),
        exclusive: false,
        ..AllocationOptions::default()
    };
    arch.schedule(&mut backend, &options).await?;

    let request = log.lock().unwrap().requests[0].clone();
    assert_eq!(request.nodes, 4);
    assert_eq!(request.partition.as_deref(), Some("compute"));
    assert_eq!(request.node_list.as_deref(), Some("node-[001-002]"));
    assert!(!request.exclusive);
    Ok(())
}

#[tokio::test]
async fn oversized_node_list_is_rejected() -> TestResult {
    init_tracing();
    let mut arch = Architecture::new();
    arch.add("svc", 2, "RED")?;
    let mut backend = FakeAllocator::new();

    let options = AllocationOptions {
        node_list: Some("n[1-3]".to_string()),
        ..AllocationOptions::default()
    };
    let result = arch.schedule(&mut backend, &options).await;
    assert!(matches!(result, Err(HpcExecError::ConfigError(_))));
    Ok(())
}

#[tokio::test]
async fn scheduling_happens_exactly_once() -> TestResult {
    init_tracing();
    let mut arch = Architecture::new();
    arch.add("svc", 2, "RED")?;
    let mut backend = FakeAllocator::new();

    arch.schedule(&mut backend, &AllocationOptions::default())
        .await?;
    let again = arch
        .schedule(&mut backend, &AllocationOptions::default())
        .await;

    assert!(matches!(again, Err(HpcExecError::ConfigError(_))));
    assert!(matches!(
        arch.add("late", 1, "RED"),
        Err(HpcExecError::ConfigError(_))
    ));
    Ok(())
}

#[tokio::test]
async fn release_is_forwarded_once() -> TestResult {
    init_tracing();
    let mut arch = Architecture::new();
    arch.add("svc", 1, "RED")?;
    let mut backend = FakeAllocator::new();
    let log = backend.log();

    arch.schedule(&mut backend, &AllocationOptions::default())
        .await?;
    arch.release(&mut backend).await?;
    arch.release(&mut backend).await?;

    assert_eq!(log.lock().unwrap().releases, 1);
    Ok(())
}

#[tokio::test]
async fn empty_architecture_cannot_be_scheduled() {
    let mut arch = Architecture::new();
    let mut backend = FakeAllocator::new();
    let result = arch
        .schedule(&mut backend, &AllocationOptions::default())
        .await;
    assert!(matches!(result, Err(HpcExecError::ConfigError(_))));
}

#[test]
fn duplicate_service_names_are_rejected() {
    let mut arch = Architecture::new();
    arch.add("svc", 1, "RED").unwrap();

    match arch.add("svc", 2, "BLUE") {
        Err(HpcExecError::DuplicateService(name)) => assert_eq!(name, "svc"),
        other => panic!("expected DuplicateService, got {other:?}"),
    }
}

#[test]
fn lookups_distinguish_unknown_and_unscheduled_services() {
    let arch = canonical();

    assert!(matches!(
        arch.hostfile("nope"),
        Err(HpcExecError::ServiceNotFound(_))
    ));
    assert!(matches!(
        arch.hostfile("client"),
        Err(HpcExecError::ConfigError(_))
    ));
}

#[test]
fn single_color_without_count_absorbs_the_request() {
    let service = Service::new("svc", 7, "RED").unwrap();
    assert_eq!(service.distribution(), [("RED".to_string(), 7)]);
    assert_eq!(service.count_for("RED"), Some(7));
    assert_eq!(service.count_for("BLUE"), None);
    assert!(!service.is_assigned());
}

#[test]
fn distributions_keep_declaration_order() {
    let service = Service::new("svc", 6, " GREEN:1 + RED:3+BLUE:2 ").unwrap();
    let colors: Vec<&str> = service
        .distribution()
        .iter()
        .map(|(c, _)| c.as_str())
        .collect();
    assert_eq!(colors, ["GREEN", "RED", "BLUE"]);
}

#[test]
fn invalid_distributions_are_config_errors() {
    let cases = [
        ("svc", 4, "RED:3"),        // single color count differs from request
        ("svc", 4, "RED:2+BLUE"),   // multi-color entry without count
        ("svc", 4, "RED:2+BLUE:1"), // counts do not add up
        ("svc", 4, "RED:2+RED:2"),  // repeated color
        ("svc", 4, "RED:x"),        // not a number
        ("svc", 4, ""),             // empty color
        ("svc", 4, "RED:0+BLUE:4"), // zero count
        ("", 4, "RED"),             // empty name
        ("svc", 0, "RED"),          // no nodes
    ];

    for (name, n, dist) in cases {
        match Service::new(name, n, dist) {
            Err(HpcExecError::ConfigError(_)) => {}
            other => panic!("expected ConfigError for ({name:?}, {n}, {dist:?}), got {other:?}"),
        }
    }
}
