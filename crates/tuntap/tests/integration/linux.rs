//! Linux TUN/TAP integration tests.
//!
//! Each test opens its own device with a kernel-assigned name and addresses
//! it in a private /24, so tests can run in parallel.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tuntap::{DeviceType, Interface, Result};

use crate::common::{exec, exec_ignore, unique_subnet};

const ETHERTYPE_IPV4: u16 = 0x0800;
const IPPROTO_ICMP: u8 = 1;

/// Address the interface and bring it up.
fn configure(name: &str, addr: &str) -> Result<()> {
    exec("ip", &["addr", "add", addr, "dev", name])?;
    exec("ip", &["link", "set", name, "up"])?;
    Ok(())
}

/// Fire pings without waiting for replies.
fn ping(args: &'static [&'static str], target: String) {
    std::thread::spawn(move || {
        for _ in 0..5 {
            let mut all: Vec<&str> = args.to_vec();
            all.extend(["-c", "1", "-W", "1", target.as_str()]);
            exec_ignore("ping", &all);
        }
    });
}

/// Read until `matches` accepts a packet, for at most five seconds.
async fn read_until(
    iface: &Arc<Interface>,
    matches: impl Fn(&[u8]) -> bool + Send + 'static,
) -> Option<Vec<u8>> {
    let iface = iface.clone();
    let reader = tokio::task::spawn_blocking(move || {
        let mut buf = vec![0u8; 2048];
        loop {
            let n = iface.read(&mut buf).ok()?;
            if matches(&buf[..n]) {
                return Some(buf[..n].to_vec());
            }
        }
    });
    tokio::time::timeout(Duration::from_secs(5), reader)
        .await
        .ok()?
        .ok()?
}

/// An IPv4 ICMP packet from `src` to `dst`.
fn is_icmp(packet: &[u8], src: [u8; 4], dst: [u8; 4]) -> bool {
    packet.len() >= 20
        && packet[0] >> 4 == 4
        && packet[9] == IPPROTO_ICMP
        && packet[12..16] == src
        && packet[16..20] == dst
}

#[tokio::test]
async fn test_tun_name() -> Result<()> {
    require_root!();

    let iface = Interface::builder().device_type(DeviceType::Tun).create()?;
    assert!(iface.name().starts_with("tun"), "name {}", iface.name());
    assert!(iface.is_tun());
    assert!(!iface.is_vector_native());
    iface.close()?;
    Ok(())
}

#[tokio::test]
async fn test_tap_name() -> Result<()> {
    require_root!();

    let iface = Interface::builder().device_type(DeviceType::Tap).create()?;
    assert!(iface.name().starts_with("tap"), "name {}", iface.name());
    assert!(iface.is_tap());
    iface.close()?;
    Ok(())
}

#[tokio::test]
async fn test_named_device() -> Result<()> {
    require_root!();

    let iface = Interface::builder().name("tuntaptest0").create()?;
    assert_eq!(iface.name(), "tuntaptest0");
    exec("ip", &["link", "show", "tuntaptest0"])?;

    iface.close()?;
    // Not persistent: the device goes away with its last descriptor.
    assert!(exec("ip", &["link", "show", "tuntaptest0"]).is_err());
    Ok(())
}

#[tokio::test]
async fn test_multi_queue() -> Result<()> {
    require_root!();

    let first = Interface::builder()
        .name("tuntapmq0")
        .multi_queue(true)
        .create()?;
    let second = Interface::builder()
        .name("tuntapmq0")
        .multi_queue(true)
        .create()?;
    assert_eq!(first.name(), second.name());
    Ok(())
}

#[tokio::test]
async fn test_close_unblocks_read() -> Result<()> {
    require_root!();

    let iface = Arc::new(Interface::builder().device_type(DeviceType::Tun).create()?);
    let reader = {
        let iface = iface.clone();
        tokio::task::spawn_blocking(move || {
            let mut buf = [0u8; 1500];
            iface.read(&mut buf)
        })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    iface.close()?;

    let result = tokio::time::timeout(Duration::from_secs(3), reader)
        .await
        .expect("read still blocked after close")
        .expect("reader panicked");
    assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotConnected);
    Ok(())
}

#[tokio::test]
async fn test_tun_ping_observed() -> Result<()> {
    require_root!();

    let net = unique_subnet();
    let iface = Arc::new(Interface::builder().device_type(DeviceType::Tun).create()?);
    configure(iface.name(), &format!("10.213.{net}.1/24"))?;

    let (src, dst) = ([10, 213, net, 1], [10, 213, net, 2]);
    ping(&[], format!("10.213.{net}.2"));

    let packet = read_until(&iface, move |p| is_icmp(p, src, dst)).await;
    iface.close()?;

    let packet = packet.expect("no ICMP packet read from the TUN device");
    // Echo request.
    assert_eq!(packet[20], 8);
    Ok(())
}

#[tokio::test]
async fn test_tap_broadcast_ping_observed() -> Result<()> {
    require_root!();

    let net = unique_subnet();
    let iface = Arc::new(Interface::builder().device_type(DeviceType::Tap).create()?);
    configure(iface.name(), &format!("10.213.{net}.1/24"))?;

    let (src, dst) = ([10, 213, net, 1], [10, 213, net, 255]);
    ping(&["-b"], format!("10.213.{net}.255"));

    let frame = read_until(&iface, move |f| {
        f.len() >= 14
            && f[..6] == [0xff; 6]
            && u16::from_be_bytes([f[12], f[13]]) == ETHERTYPE_IPV4
            && is_icmp(&f[14..], src, dst)
    })
    .await;
    iface.close()?;

    assert!(frame.is_some(), "no broadcast ICMP frame read from the TAP device");
    Ok(())
}

#[tokio::test]
async fn test_write_reaches_stack() -> Result<()> {
    require_root!();

    let iface = Interface::builder().device_type(DeviceType::Tun).create()?;
    configure(iface.name(), "10.213.250.1/24")?;

    // Bare IPv4 header; the stack drops it later on the zero checksum.
    let mut packet = [0u8; 20];
    packet[0] = 0x45;
    packet[3] = 20;
    packet[8] = 64;
    packet[9] = 253;
    packet[12..16].copy_from_slice(&[10, 213, 250, 2]);
    packet[16..20].copy_from_slice(&[10, 213, 250, 1]);
    assert_eq!(iface.write(&packet)?, packet.len());

    let bufs: [&[u8]; 2] = [&packet, &packet];
    assert_eq!(iface.write_vector(&bufs).map_err(io::Error::from)?, 2);
    Ok(())
}

#[tokio::test]
async fn test_set_mtu() -> Result<()> {
    require_root!();

    let iface = Interface::builder().device_type(DeviceType::Tun).create()?;
    iface.set_mtu(1400)?;

    let mtu = std::fs::read_to_string(format!("/sys/class/net/{}/mtu", iface.name()))?;
    assert_eq!(mtu.trim(), "1400");
    Ok(())
}

#[tokio::test]
async fn test_persist() -> Result<()> {
    require_root!();

    let iface = Interface::builder()
        .name("tuntappersist0")
        .persist(true)
        .create()?;
    iface.close()?;
    exec("ip", &["link", "show", "tuntappersist0"])?;

    // Reopening without persistence clears the flag.
    let iface = Interface::builder().name("tuntappersist0").create()?;
    iface.close()?;
    assert!(exec("ip", &["link", "show", "tuntappersist0"]).is_err());
    Ok(())
}
