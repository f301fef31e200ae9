use std::io;
use std::mem;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::os::unix::io::RawFd;

// Netfilter's NAT-redirect original-destination socket options. Neither
// is exposed by `libc` (they live in `<linux/netfilter_ipv4.h>` and
// `<linux/netfilter_ipv6/ip6_tables.h>`, not the libc headers `libc`
// binds), so the numeric values are reproduced here directly.
const SOL_IP: libc::c_int = 0;
const SO_ORIGINAL_DST: libc::c_int = 80;
const SOL_IPV6: libc::c_int = 41;
const IP6T_SO_ORIGINAL_DST: libc::c_int = 80;

/// Recovers the pre-redirection destination of a socket that the
/// kernel's packet filter diverted to us, trying the IPv6 variant of the
/// query first and falling back to IPv4.
pub fn original_dst(fd: RawFd) -> io::Result<SocketAddr> {
    query(fd, SOL_IPV6, IP6T_SO_ORIGINAL_DST).or_else(|_| query(fd, SOL_IP, SO_ORIGINAL_DST))
}

fn query(fd: RawFd, level: libc::c_int, optname: libc::c_int) -> io::Result<SocketAddr> {
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;

    let rc = unsafe {
        libc::getsockopt(
            fd,
            level,
            optname,
            &mut storage as *mut _ as *mut libc::c_void,
            &mut len,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }

    sockaddr_from_storage(&storage)
}

fn sockaddr_from_storage(storage: &libc::sockaddr_storage) -> io::Result<SocketAddr> {
    match storage.ss_family as libc::c_int {
        libc::AF_INET => {
            let addr: &libc::sockaddr_in =
                unsafe { &*(storage as *const _ as *const libc::sockaddr_in) };
            let ip = Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr));
            let port = u16::from_be(addr.sin_port);
            Ok(SocketAddr::V4(SocketAddrV4::new(ip, port)))
        }
        libc::AF_INET6 => {
            let addr: &libc::sockaddr_in6 =
                unsafe { &*(storage as *const _ as *const libc::sockaddr_in6) };
            let ip = Ipv6Addr::from(addr.sin6_addr.s6_addr);
            let port = u16::from_be(addr.sin6_port);
            Ok(SocketAddr::V6(SocketAddrV6::new(
                ip,
                port,
                addr.sin6_flowinfo,
                addr.sin6_scope_id,
            )))
        }
        family => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unsupported address family {family}"),
        )),
    }
}

/// Formats an original destination the way the wire protocol wants it:
/// a bare, printable host string (no brackets around IPv6 literals) and
/// a decimal port string.
pub fn format_host_port(addr: SocketAddr) -> (String, String) {
    let host = match addr {
        SocketAddr::V4(v4) => v4.ip().to_string(),
        SocketAddr::V6(v6) => v6.ip().to_string(),
    };
    (host, addr.port().to_string())
}
