use std::net::SocketAddr;

use hyper::HeaderMap;

/// 프록시가 붙이는 원 클라이언트 주소 헤더
pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// 요청에서 뽑아낸 방문자 정보
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitorIdentity {
    pub ip: String,
    pub host: String,
    pub port: u16,
}

impl VisitorIdentity {
    /// 헤더와 소켓 주소로 방문자 식별
    ///
    /// IP 는 `X-Forwarded-For` 의 첫 항목을 우선하고, 없으면 소켓 주소를 씁니다.
    /// 호스트와 포트는 항상 소켓 주소 기준입니다.
    pub fn from_request(headers: &HeaderMap, peer: SocketAddr) -> Self {
        let peer_ip = peer.ip().to_string();
        let ip = forwarded_ip(headers).unwrap_or_else(|| peer_ip.clone());

        Self {
            ip,
            host: peer_ip,
            port: peer.port(),
        }
    }
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(FORWARDED_FOR)?.to_str().ok()?;
    value
        .split(',')
        .map(str::trim)
        .find(|entry| !entry.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    fn peer() -> SocketAddr {
        "198.51.100.1:51234".parse().unwrap()
    }

    #[test]
    fn falls_back_to_peer_address() {
        let identity = VisitorIdentity::from_request(&HeaderMap::new(), peer());
        assert_eq!(identity.ip, "198.51.100.1");
        assert_eq!(identity.host, "198.51.100.1");
        assert_eq!(identity.port, 51234);
    }

    #[test]
    fn prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, HeaderValue::from_static("203.0.113.5"));
        let identity = VisitorIdentity::from_request(&headers, peer());
        assert_eq!(identity.ip, "203.0.113.5");
        assert_eq!(identity.host, "198.51.100.1");
    }

    #[test]
    fn takes_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            FORWARDED_FOR,
            HeaderValue::from_static(" 203.0.113.5 , 10.0.0.1, 10.0.0.2"),
        );
        let identity = VisitorIdentity::from_request(&headers, peer());
        assert_eq!(identity.ip, "203.0.113.5");
    }

    #[test]
    fn ignores_blank_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, HeaderValue::from_static("  ,  "));
        let identity = VisitorIdentity::from_request(&headers, peer());
        assert_eq!(identity.ip, "198.51.100.1");
    }

    #[test]
    fn ipv6_peer() {
        let peer: SocketAddr = "[2001:db8::1]:443".parse().unwrap();
        let identity = VisitorIdentity::from_request(&HeaderMap::new(), peer);
        assert_eq!(identity.ip, "2001:db8::1");
        assert_eq!(identity.port, 443);
    }
}
