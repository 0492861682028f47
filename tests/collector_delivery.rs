use std::time::Duration;

use weaving_inspect::delivery::{
    DeliveryTransport, PICTURES_BATCH_PATH, STATUS_CREATED, STATUS_NO_CONTENT,
    SURFACE_MOVEMENT_PATH,
};
use weaving_inspect::{
    CollectorServer, DeliveryClient, HttpTransport, LightCondition, PicturesBatch,
    SurfaceMovement,
};

#[test]
fn http_transport_against_collector() {
    let collector = CollectorServer::new("127.0.0.1:0").spawn().expect("spawn collector");
    let mut transport =
        HttpTransport::new(&collector.url(), Duration::from_secs(2)).expect("transport");

    let status = transport
        .post_json(SURFACE_MOVEMENT_PATH, br#"{"velocity":30.0,"displacement":1.0}"#)
        .expect("post surface movement");
    assert_eq!(status, STATUS_CREATED);
    assert_eq!(transport.ping().expect("ping"), STATUS_NO_CONTENT);

    // Wrong endpoint is a status, not a transport error.
    assert_eq!(transport.post_json("frames", b"{}").expect("post"), 404);

    let received = collector.received();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].method, "POST");
    assert_eq!(received[0].body["displacement"], 1.0);
    assert_eq!(received[1].path, "ping");
    collector.stop().expect("stop collector");
}

#[test]
fn delivery_client_reports_to_collector() {
    let collector = CollectorServer::new("127.0.0.1:0").spawn().expect("spawn collector");
    let transport =
        HttpTransport::new(&collector.url(), Duration::from_secs(2)).expect("transport");
    let client = DeliveryClient::start(Box::new(transport), 8).expect("start delivery");

    let surface = SurfaceMovement {
        velocity: 29.5,
        displacement: 0.98,
    };
    let handle = client.handle();
    assert!(handle.surface_movement(surface));
    assert!(handle.pictures_batch(PicturesBatch::new(LightCondition::ALL, surface)));
    assert_eq!(handle.ping().expect("ping"), STATUS_NO_CONTENT);
    drop(handle);

    let stats = client.shutdown().expect("shutdown delivery");
    assert_eq!(stats.delivered, 2);
    assert_eq!(stats.rejected, 0);
    assert_eq!(stats.failed, 0);

    let batches = collector.received_on(PICTURES_BATCH_PATH);
    assert_eq!(batches.len(), 1);
    let lights = batches[0].body["lights"].as_array().expect("lights array");
    assert_eq!(lights.len(), 2);
    assert_eq!(lights[0]["light"], "blue");
    assert_eq!(lights[1]["light"], "green");
    assert_eq!(lights[1]["surface_velocity"], 29.5);
    assert_eq!(lights[0]["surface_displacement"], 0.98);

    let surfaces = collector.received_on(SURFACE_MOVEMENT_PATH);
    assert_eq!(surfaces[0].body["velocity"], 29.5);
    collector.stop().expect("stop collector");
}

#[test]
fn unreachable_server_counts_failures() {
    // Bind then stop to get a port with nothing listening.
    let collector = CollectorServer::new("127.0.0.1:0").spawn().expect("spawn collector");
    let url = collector.url();
    collector.stop().expect("stop collector");

    let transport = HttpTransport::new(&url, Duration::from_millis(500)).expect("transport");
    let client = DeliveryClient::start(Box::new(transport), 4).expect("start delivery");
    client.handle().surface_movement(SurfaceMovement {
        velocity: 30.0,
        displacement: 1.0,
    });
    let stats = client.shutdown().expect("shutdown delivery");
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.delivered, 0);
}
