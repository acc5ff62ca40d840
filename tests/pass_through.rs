//! S1: with no unit-ID remapping, a reply comes back byte-identical to what
//! the upstream device sent.

use std::time::Duration;

use modbus_proxy_core::config::{DeviceConfig, ListenConfig, ModbusConfig, SerialParams};
use modbus_proxy_core::core::bridge::Bridge;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const REQUEST: &[u8] = &[0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x11, 0x03, 0x00, 0x00, 0x00, 0x0A];

async fn start_fake_device() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn device_config(upstream_port: u16) -> DeviceConfig {
    DeviceConfig {
        modbus: ModbusConfig {
            url: format!("tcp://127.0.0.1:{upstream_port}"),
            timeout: 2.0,
            connection_time: 0.0,
            serial: SerialParams::default(),
        },
        listen: ListenConfig { bind: "127.0.0.1:0".into() },
        unit_id_remapping: Default::default(),
    }
}

#[tokio::test]
async fn replies_byte_identical_with_empty_remap() {
    let (device_listener, device_port) = start_fake_device().await;

    let device_task = tokio::spawn(async move {
        let (mut stream, _) = device_listener.accept().await.unwrap();
        let mut buf = vec![0u8; REQUEST.len()];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, REQUEST);

        let mut reply = vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x17, 0x11, 0x03, 0x14];
        reply.extend(std::iter::repeat(0xAB).take(20));
        stream.write_all(&reply).await.unwrap();
        reply
    });

    let bridge = Bridge::new(&device_config(device_port)).unwrap();
    let handle = bridge.start().await.unwrap();

    let mut client = TcpStream::connect(handle.listen_addr()).await.unwrap();
    client.write_all(REQUEST).await.unwrap();

    let expected = device_task.await.unwrap();
    let mut got = vec![0u8; expected.len()];
    tokio::time::timeout(Duration::from_secs(2), client.read_exact(&mut got))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(got, expected);

    handle.stop().await;
}
