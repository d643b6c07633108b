//! End-to-end integration tests
//! Run with: cargo test --test e2e -- --ignored (requires running vethkube serve)

use std::time::Duration;

const API_URL: &str = "http://localhost:8080";

#[derive(Debug, serde::Deserialize)]
struct HealthResponse {
    status: String,
}

#[derive(Debug, serde::Deserialize)]
struct StatResponse {
    idle: usize,
    inuse: usize,
    capacity: usize,
}

#[derive(Debug, serde::Deserialize)]
struct ResourceResponse {
    id: String,
    host_veth: String,
}

#[derive(Debug, serde::Serialize)]
struct AcquireRequest {
    sandbox_id: String,
}

fn client() -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap()
}

#[test]
#[ignore] // Run manually: cargo test --test e2e -- --ignored
fn test_health() {
    let resp: HealthResponse = client()
        .get(format!("{}/health", API_URL))
        .send()
        .unwrap()
        .json()
        .unwrap();

    assert_eq!(resp.status, "ok");
}

#[test]
#[ignore]
fn test_acquire_and_release() {
    let c = client();

    let before: StatResponse = c
        .get(format!("{}/api/v1/pool", API_URL))
        .send()
        .unwrap()
        .json()
        .unwrap();

    let resource: ResourceResponse = c
        .post(format!("{}/api/v1/acquire", API_URL))
        .json(&AcquireRequest {
            sandbox_id: "e2e-test".to_string(),
        })
        .send()
        .unwrap()
        .json()
        .unwrap();

    println!("Acquired {} ({})", resource.id, resource.host_veth);
    assert!(!resource.host_veth.is_empty());

    let during: StatResponse = c
        .get(format!("{}/api/v1/pool", API_URL))
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(during.inuse, before.inuse + 1);
    assert!(during.idle + during.inuse <= during.capacity);

    let resp = c
        .post(format!("{}/api/v1/release/{}", API_URL, resource.id))
        .send()
        .unwrap();
    assert!(resp.status().is_success());
}

#[test]
#[ignore]
fn test_parallel_acquire() {
    use std::thread;

    let handles: Vec<_> = (0..2)
        .map(|i| {
            thread::spawn(move || {
                let c = client();
                let resource: ResourceResponse = c
                    .post(format!("{}/api/v1/acquire", API_URL))
                    .json(&AcquireRequest {
                        sandbox_id: format!("e2e-parallel-{}", i),
                    })
                    .send()
                    .unwrap()
                    .json()
                    .unwrap();
                println!("[{}] Acquired {}", i, resource.id);
                resource
            })
        })
        .collect();

    let resources: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // Outstanding interfaces must be distinct
    assert_ne!(resources[0].id, resources[1].id);

    let c = client();
    for resource in resources {
        let resp = c
            .post(format!("{}/api/v1/release/{}", API_URL, resource.id))
            .send()
            .unwrap();
        assert!(resp.status().is_success());
    }
}
