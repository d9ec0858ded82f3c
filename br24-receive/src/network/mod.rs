use socket2::{Domain, Protocol, Type};
use std::future::pending;
use std::{
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4},
};
use tokio::net::UdpSocket;

use crate::radar::RadarError;

// this will be common for all our sockets
pub fn new_socket() -> io::Result<socket2::Socket> {
    let socket = socket2::Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

    // the receive loop multiplexes, a blocking socket would stall it
    socket.set_nonblocking(true)?;
    socket.set_reuse_address(true)?;

    Ok(socket)
}

/// On Windows, unlike all Unix variants, it is improper to bind to the multicast address
///
/// see https://msdn.microsoft.com/en-us/library/windows/desktop/ms737550(v=vs.85).aspx
#[cfg(windows)]
fn bind_to_multicast(
    socket: &socket2::Socket,
    addr: &SocketAddrV4,
    nic_addr: &Ipv4Addr,
) -> io::Result<()> {
    socket.join_multicast_v4(addr.ip(), nic_addr)?;

    let socketaddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), addr.port());
    socket.bind(&socket2::SockAddr::from(socketaddr))?;
    log::trace!("Binding multicast socket to {}", socketaddr);

    Ok(())
}

/// On unixes we bind to the multicast address, which causes multicast packets to be filtered
#[cfg(unix)]
fn bind_to_multicast(
    socket: &socket2::Socket,
    addr: &SocketAddrV4,
    nic_addr: &Ipv4Addr,
) -> io::Result<()> {
    // Linux is special, if we don't disable IP_MULTICAST_ALL the kernel forgets on
    // which device the multicast packet arrived and sends it to all sockets.
    // Radar A on one NIC would then also show up on the socket for another NIC.
    #[cfg(target_os = "linux")]
    {
        use std::{mem, os::unix::io::AsRawFd};

        unsafe {
            let optval: libc::c_int = 0;
            let ret = libc::setsockopt(
                socket.as_raw_fd(),
                libc::SOL_IP,
                libc::IP_MULTICAST_ALL,
                &optval as *const _ as *const libc::c_void,
                mem::size_of_val(&optval) as libc::socklen_t,
            );
            if ret != 0 {
                return Err(io::Error::last_os_error());
            }
        }
    }

    let socketaddr = SocketAddr::new(IpAddr::V4(*addr.ip()), addr.port());
    socket.bind(&socket2::SockAddr::from(socketaddr))?;

    socket.join_multicast_v4(addr.ip(), nic_addr)?;

    log::trace!(
        "Binding multicast socket to {} for multicast group {} nic {}",
        socketaddr,
        addr.ip(),
        nic_addr
    );

    Ok(())
}

/// Join multicast group `addr` on the interface with address `nic_addr`.
///
/// Must be called from within a tokio runtime.
pub fn create_udp_multicast_listen(
    addr: &SocketAddrV4,
    nic_addr: &Ipv4Addr,
) -> io::Result<UdpSocket> {
    let socket: socket2::Socket = new_socket()?;

    bind_to_multicast(&socket, addr, nic_addr)?;

    let socket = UdpSocket::from_std(socket.into())?;
    Ok(socket)
}

/// A connected pair of loopback sockets. Sending anything on the first one
/// wakes up whoever waits on the second.
pub fn create_shutdown_pair() -> io::Result<(std::net::UdpSocket, std::net::UdpSocket)> {
    let receiver = std::net::UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))?;
    receiver.set_nonblocking(true)?;

    let sender = std::net::UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))?;
    sender.connect(receiver.local_addr()?)?;

    log::trace!(
        "Shutdown pair {} -> {}",
        sender.local_addr()?,
        receiver.local_addr()?
    );
    Ok((sender, receiver))
}

/// Receive on `sock` if there is one, otherwise never complete.
///
/// Lets a `select!` branch wait on a socket that may not be open yet.
pub async fn recv_buf_from_opt(
    sock: Option<&UdpSocket>,
    buf: &mut Vec<u8>,
) -> io::Result<(usize, SocketAddr)> {
    match sock {
        Some(sock) => sock.recv_buf_from(buf).await,
        None => pending().await,
    }
}

/// Source of local IPv4 addresses to look for radars on
pub trait InterfaceSource: Send {
    fn ipv4_addresses(&mut self) -> Result<Vec<Ipv4Addr>, RadarError>;
}

/// The interfaces of this machine
#[derive(Debug, Clone, Default)]
pub struct SystemInterfaces {
    /// Only use the interface with this name
    only_interface: Option<String>,
}

impl SystemInterfaces {
    pub fn new(only_interface: Option<String>) -> Self {
        SystemInterfaces { only_interface }
    }
}

impl InterfaceSource for SystemInterfaces {
    fn ipv4_addresses(&mut self) -> Result<Vec<Ipv4Addr>, RadarError> {
        use network_interface::{NetworkInterface, NetworkInterfaceConfig};

        let interfaces = NetworkInterface::show().map_err(|e| {
            log::warn!("Cannot list network interfaces: {}", e);
            RadarError::EnumerationFailed
        })?;
        log::trace!("getifaddrs() dump {:#?}", interfaces);

        let mut addresses = Vec::new();
        for itf in interfaces {
            if let Some(only) = &self.only_interface {
                if only != &itf.name {
                    continue;
                }
            }
            for addr in &itf.addr {
                if let IpAddr::V4(nic_ip) = addr.ip() {
                    if is_valid_ipv4_interface(&nic_ip) {
                        addresses.push(nic_ip);
                    }
                }
            }
        }
        Ok(addresses)
    }
}

fn is_valid_ipv4_interface(addr: &Ipv4Addr) -> bool {
    !addr.is_loopback() && !addr.is_unspecified()
}

/// Round-robin over the local IPv4 addresses.
///
/// The list is taken once and walked one address per call to
/// [`InterfaceCursor::pick_next`]; when it runs out the interfaces are
/// enumerated again, so addresses that appeared in the meantime are found.
pub struct InterfaceCursor {
    source: Box<dyn InterfaceSource>,
    addresses: Vec<Ipv4Addr>,
    next: usize,
    current: Option<Ipv4Addr>,
}

impl InterfaceCursor {
    pub fn new(source: Box<dyn InterfaceSource>) -> Self {
        InterfaceCursor {
            source,
            addresses: Vec::new(),
            next: 0,
            current: None,
        }
    }

    /// Move to the next usable address. On error the selection is cleared.
    pub fn pick_next(&mut self) -> Result<Ipv4Addr, RadarError> {
        self.current = None;

        if self.next >= self.addresses.len() {
            self.addresses = self.source.ipv4_addresses()?;
            self.next = 0;
        }

        let addr = *self
            .addresses
            .get(self.next)
            .ok_or(RadarError::NoInterface)?;
        self.next += 1;
        self.current = Some(addr);
        Ok(addr)
    }

    /// The selected interface address
    pub fn current(&self) -> Option<Ipv4Addr> {
        self.current
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    /// Forget the enumerated list
    pub fn release(&mut self) {
        self.addresses.clear();
        self.next = 0;
        self.current = None;
    }
}

impl std::fmt::Debug for InterfaceCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterfaceCursor")
            .field("addresses", &self.addresses)
            .field("next", &self.next)
            .field("current", &self.current)
            .finish()
    }
}
