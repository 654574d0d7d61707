//! TUN over the utun kernel control socket.

use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;

use zerocopy::{FromZeros, Immutable, IntoBytes, KnownLayout};

use crate::config::{Config, DeviceType};
use crate::error::{Error, Result};
use crate::framing::Framed;
use crate::interface::{DeviceOpener, Interface};
use crate::name::{IFNAMSIZ, parse_optional_unit};
use crate::unix::{IoctlMtu, PollFd, owned};

const UTUN_CONTROL_NAME: &[u8] = b"com.apple.net.utun_control";

const AF_SYSTEM: libc::c_int = 32;
const AF_SYS_CONTROL: u16 = 2;
const SYSPROTO_CONTROL: libc::c_int = 2;
const UTUN_OPT_IFNAME: libc::c_int = 2;

/// `_IOWR('N', 3, struct ctl_info)`.
const CTLIOCGINFO: libc::c_ulong = 0xc064_4e03;

/// `struct ctl_info`.
#[repr(C)]
#[derive(Clone, Copy, FromZeros, IntoBytes, Immutable, KnownLayout)]
struct CtlInfo {
    ctl_id: u32,
    ctl_name: [u8; 96],
}

/// `struct sockaddr_ctl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromZeros, IntoBytes, Immutable, KnownLayout)]
struct SockaddrCtl {
    sc_len: u8,
    sc_family: u8,
    ss_sysaddr: u16,
    sc_id: u32,
    sc_unit: u32,
    sc_reserved: [u32; 5],
}

impl SockaddrCtl {
    /// Address of control `id`. Unit 0 lets the kernel pick `utunN`;
    /// otherwise `utunN` is unit `N + 1`.
    fn new(id: u32, unit: Option<u32>) -> Self {
        let mut addr = Self::new_zeroed();
        addr.sc_len = size_of::<Self>() as u8;
        addr.sc_family = AF_SYSTEM as u8;
        addr.ss_sysaddr = AF_SYS_CONTROL;
        addr.sc_id = id;
        addr.sc_unit = unit.map_or(0, |u| u + 1);
        addr
    }
}

/// Opener for utun interfaces.
#[derive(Debug, Clone, Copy, Default)]
pub struct UtunOpener;

impl DeviceOpener for UtunOpener {
    fn open(&self, config: &Config) -> Result<Interface> {
        if config.device_type != DeviceType::Tun {
            return Err(Error::InvalidConfig("utun only carries TUN packets".into()));
        }
        let unit = parse_optional_unit(config.platform.name.as_deref(), "utun")?;

        let fd = owned(
            unsafe { libc::socket(AF_SYSTEM, libc::SOCK_DGRAM, SYSPROTO_CONTROL) },
            "socket(AF_SYSTEM)",
        )?;
        let raw = fd.as_raw_fd();

        let id = control_id(raw)?;
        connect(raw, &SockaddrCtl::new(id, unit))?;
        let name = interface_name(raw)?;

        let transport = Arc::new(Framed::new(PollFd::new(fd)?));
        tracing::debug!(name = %name, "opened utun device");

        Ok(Interface::from_transport(
            DeviceType::Tun,
            name,
            transport,
            Arc::new(IoctlMtu),
        ))
    }
}

fn control_id(fd: RawFd) -> Result<u32> {
    let mut info = CtlInfo::new_zeroed();
    info.ctl_name[..UTUN_CONTROL_NAME.len()].copy_from_slice(UTUN_CONTROL_NAME);
    let ret = unsafe { libc::ioctl(fd, CTLIOCGINFO as _, &mut info as *mut CtlInfo) };
    if ret < 0 {
        return Err(Error::ioctl("CTLIOCGINFO", io::Error::last_os_error()));
    }
    Ok(info.ctl_id)
}

fn connect(fd: RawFd, addr: &SockaddrCtl) -> Result<()> {
    let ret = unsafe {
        libc::connect(
            fd,
            (addr as *const SockaddrCtl).cast(),
            size_of::<SockaddrCtl>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(Error::syscall("connect(utun)", io::Error::last_os_error()));
    }
    Ok(())
}

fn interface_name(fd: RawFd) -> Result<String> {
    let mut name = [0u8; IFNAMSIZ];
    let mut len = name.len() as libc::socklen_t;
    let ret = unsafe {
        libc::getsockopt(
            fd,
            SYSPROTO_CONTROL,
            UTUN_OPT_IFNAME,
            name.as_mut_ptr().cast(),
            &mut len,
        )
    };
    if ret < 0 {
        return Err(Error::syscall(
            "getsockopt(UTUN_OPT_IFNAME)",
            io::Error::last_os_error(),
        ));
    }

    let len = name[..len as usize]
        .iter()
        .position(|&c| c == 0)
        .unwrap_or(len as usize);
    Ok(String::from_utf8_lossy(&name[..len]).into_owned())
}
