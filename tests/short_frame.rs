//! Boundary case: a client that sends only part of an MBAP frame (3 of 6
//! prefix bytes) and then closes must end its session without the proxy
//! ever issuing an upstream transaction.

use std::time::Duration;

use modbus_proxy_core::config::{DeviceConfig, ListenConfig, ModbusConfig, SerialParams};
use modbus_proxy_core::core::bridge::Bridge;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

#[tokio::test]
async fn short_frame_ends_session_without_an_upstream_transaction() {
    let device_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let device_port = device_listener.local_addr().unwrap().port();

    let device_task = tokio::spawn(async move {
        // No connection should ever reach the device for this test.
        tokio::time::timeout(Duration::from_millis(300), device_listener.accept())
            .await
            .expect_err("a short client frame must not trigger an upstream transaction")
    });

    let device = DeviceConfig {
        modbus: ModbusConfig {
            url: format!("tcp://127.0.0.1:{device_port}"),
            timeout: 2.0,
            connection_time: 0.0,
            serial: SerialParams::default(),
        },
        listen: ListenConfig { bind: "127.0.0.1:0".into() },
        unit_id_remapping: Default::default(),
    };

    let bridge = Bridge::new(&device).unwrap();
    let handle = bridge.start().await.unwrap();

    let mut client = TcpStream::connect(handle.listen_addr()).await.unwrap();
    client.write_all(&[0x00, 0x01, 0x00]).await.unwrap();
    drop(client);

    device_task.await.unwrap();
    handle.stop().await;
}
