//! AF_PACKET socket implementation
//!
//! One socket per configured interface, opened in promiscuous mode. The
//! default unicast filter would starve two of the engine's inputs: claims
//! on our own address exchanged between other hosts (what conflict
//! detection defends against) and RARP requests addressed to the booting
//! host's own MAC rather than to us.

use super::{Capture, RxInfo};
use crate::{Error, Result};
use std::ffi::CString;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use tokio::io::unix::AsyncFd;

/// Raw descriptor with close-on-drop, so every early return in `bind`
/// releases the socket.
struct OwnedFd(RawFd);

impl AsRawFd for OwnedFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

impl Drop for OwnedFd {
    fn drop(&mut self) {
        unsafe { libc::close(self.0) };
    }
}

fn last_errno() -> Error {
    Error::Io(io::Error::last_os_error())
}

fn resolve_ifindex(ifname: &str) -> Result<i32> {
    let name = CString::new(ifname).map_err(|_| Error::InterfaceNotFound {
        name: ifname.to_string(),
    })?;
    let index = unsafe { libc::if_nametoindex(name.as_ptr()) };
    if index == 0 {
        return Err(Error::InterfaceNotFound {
            name: ifname.to_string(),
        });
    }
    Ok(index as i32)
}

/// Join or leave promiscuous mode on the bound interface.
fn promisc_request(fd: RawFd, ifindex: i32, join: bool) -> Result<()> {
    let mreq = libc::packet_mreq {
        mr_ifindex: ifindex,
        mr_type: libc::PACKET_MR_PROMISC as u16,
        mr_alen: 0,
        mr_address: [0; 8],
    };
    let optname = if join {
        libc::PACKET_ADD_MEMBERSHIP
    } else {
        libc::PACKET_DROP_MEMBERSHIP
    };

    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_PACKET,
            optname,
            &mreq as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::packet_mreq>() as u32,
        )
    };
    if ret < 0 {
        return Err(last_errno());
    }
    Ok(())
}

/// AF_PACKET socket bound to one interface
pub struct AfPacketSocket {
    async_fd: AsyncFd<OwnedFd>,
    ifindex: i32,
}

impl AfPacketSocket {
    /// Open a non-blocking raw socket on `ifname` and join promiscuous
    /// mode.
    pub fn bind(ifname: &str) -> Result<Self> {
        let ifindex = resolve_ifindex(ifname)?;

        let protocol = (libc::ETH_P_ALL as u16).to_be();
        let raw = unsafe {
            libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW | libc::SOCK_NONBLOCK,
                protocol as i32,
            )
        };
        if raw < 0 {
            return Err(last_errno());
        }
        let fd = OwnedFd(raw);

        let mut addr: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as u16;
        addr.sll_protocol = protocol;
        addr.sll_ifindex = ifindex;

        let ret = unsafe {
            libc::bind(
                fd.0,
                &addr as *const _ as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_ll>() as u32,
            )
        };
        if ret < 0 {
            return Err(last_errno());
        }

        promisc_request(fd.0, ifindex, true)?;

        Ok(Self {
            async_fd: AsyncFd::new(fd).map_err(Error::Io)?,
            ifindex,
        })
    }

    /// Receive a frame (async)
    pub async fn recv(&mut self, buf: &mut [u8]) -> Result<RxInfo> {
        loop {
            let mut guard = self.async_fd.readable_mut().await.map_err(Error::Io)?;

            let attempt = guard.try_io(|inner| {
                let n = unsafe {
                    libc::recv(inner.get_ref().0, buf.as_mut_ptr().cast(), buf.len(), 0)
                };
                if n < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            });

            match attempt {
                Ok(result) => {
                    return result
                        .map(|len| RxInfo { len, vlan_id: None })
                        .map_err(Error::Io);
                }
                Err(_would_block) => continue,
            }
        }
    }

    /// Send a frame (async)
    pub async fn send(&mut self, buf: &[u8]) -> Result<usize> {
        loop {
            let mut guard = self.async_fd.writable_mut().await.map_err(Error::Io)?;

            let attempt = guard.try_io(|inner| {
                let n = unsafe { libc::send(inner.get_ref().0, buf.as_ptr().cast(), buf.len(), 0) };
                if n < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            });

            match attempt {
                Ok(result) => return result.map_err(Error::Io),
                Err(_would_block) => continue,
            }
        }
    }
}

impl AsRawFd for AfPacketSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.async_fd.get_ref().0
    }
}

impl Drop for AfPacketSocket {
    fn drop(&mut self) {
        // The descriptor itself is closed by OwnedFd; only the
        // promiscuous membership needs an explicit exit
        let _ = promisc_request(self.async_fd.get_ref().0, self.ifindex, false);
    }
}

impl Capture for AfPacketSocket {
    async fn recv(&mut self, buf: &mut [u8]) -> Result<RxInfo> {
        AfPacketSocket::recv(self, buf).await
    }

    async fn send(&mut self, buf: &[u8]) -> Result<usize> {
        AfPacketSocket::send(self, buf).await
    }
}
