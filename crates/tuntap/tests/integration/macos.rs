//! macOS utun and feth integration tests.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tuntap::{DeviceType, Interface, Result};

use crate::common::{exec, exec_ignore, unique_subnet};

/// feth tests pick free unit numbers; run them one at a time.
static FETH_LOCK: Mutex<()> = Mutex::new(());

fn feth_names() -> Result<Vec<String>> {
    Ok(exec("ifconfig", &["-l"])?
        .split_whitespace()
        .filter(|n| n.starts_with("feth"))
        .map(str::to_string)
        .collect())
}

#[tokio::test]
async fn test_utun_name() -> Result<()> {
    require_root!();

    let iface = Interface::builder().device_type(DeviceType::Tun).create()?;
    assert!(iface.name().starts_with("utun"), "name {}", iface.name());
    assert!(iface.is_tun());
    assert_eq!(iface.secondary_name(), None);
    iface.close()?;
    Ok(())
}

#[tokio::test]
async fn test_utun_close_unblocks_read() -> Result<()> {
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
async fn test_utun_ping_observed() -> Result<()> {
    require_root!();

    let net = unique_subnet();
    let iface = Arc::new(Interface::builder().device_type(DeviceType::Tun).create()?);
    let (local, peer) = (format!("10.214.{net}.1"), format!("10.214.{net}.2"));
    exec("ifconfig", &[iface.name(), local.as_str(), peer.as_str(), "up"])?;

    {
        let peer = peer.clone();
        std::thread::spawn(move || {
            for _ in 0..5 {
                exec_ignore("ping", &["-c", "1", "-t", "1", peer.as_str()]);
            }
        });
    }

    let reader = {
        let iface = iface.clone();
        tokio::task::spawn_blocking(move || {
            let mut buf = [0u8; 2048];
            loop {
                let n = iface.read(&mut buf).ok()?;
                let p = &buf[..n];
                if n >= 20
                    && p[0] >> 4 == 4
                    && p[9] == 1
                    && p[12..16] == [10, 214, net, 1]
                    && p[16..20] == [10, 214, net, 2]
                {
                    return Some(p.to_vec());
                }
            }
        })
    };
    let packet = tokio::time::timeout(Duration::from_secs(5), reader).await;
    iface.close()?;

    let packet = packet.ok().and_then(|r| r.ok()).flatten();
    assert!(packet.is_some(), "no ICMP packet read from the utun device");
    Ok(())
}

#[tokio::test]
async fn test_feth_pair() -> Result<()> {
    require_root!();
    let _serial = FETH_LOCK.lock().unwrap_or_else(|e| e.into_inner());

    let iface = Interface::builder().device_type(DeviceType::Tap).create()?;
    let name = iface.name().to_string();
    let injector = iface
        .secondary_name()
        .expect("feth bridge has an injector")
        .to_string();
    assert!(name.starts_with("feth"));
    assert!(injector.starts_with("feth"));
    assert_ne!(name, injector);

    let names = feth_names()?;
    assert!(names.contains(&name) && names.contains(&injector));

    iface.set_mtu(9000)?;
    let info = exec("ifconfig", &[name.as_str()])?;
    assert!(info.contains("mtu 9000"), "{info}");

    iface.close()?;
    let names = feth_names()?;
    assert!(!names.contains(&name), "{name} left behind");
    assert!(!names.contains(&injector), "{injector} left behind");
    Ok(())
}

#[tokio::test]
async fn test_feth_rollback() -> Result<()> {
    require_root!();
    let _serial = FETH_LOCK.lock().unwrap_or_else(|e| e.into_inner());

    let first = Interface::builder().device_type(DeviceType::Tap).create()?;
    let taken = first.secondary_name().unwrap_or_default().to_string();
    let before = feth_names()?;

    // The primary is created, then the injector collides and everything
    // created so far must be destroyed.
    let err = Interface::builder()
        .device_type(DeviceType::Tap)
        .tap_injector_name(taken)
        .create()
        .unwrap_err();
    assert!(!err.is_config_error(), "{err}");
    assert_eq!(feth_names()?, before);

    first.close()?;
    Ok(())
}
