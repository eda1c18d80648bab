//! 도메인 타입 -- 시스템 전역에서 사용되는 공통 타입
//!
//! 컨트롤러와 어플라이언스 클라이언트가 주고받는 포워딩 규칙을 정의합니다.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 포트 포워딩 규칙
///
/// 어플라이언스가 수신한 트래픽을 `address:port`로 전달하도록 하는 규칙입니다.
/// 세 필드 전체에 대한 값 동등성으로 비교하며, 어플라이언스 내부 ID는 보관하지 않습니다.
/// 삭제 시점에 어플라이언스 클라이언트가 규칙 값으로 ID를 다시 찾습니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ForwardRule {
    /// 규칙 이름 (`<namespace>-<name>`)
    pub name: String,
    /// 전달 대상 주소 (워크로드의 호스트 IP, 스케줄 전이면 빈 문자열)
    pub address: String,
    /// 전달 대상 포트 (호스트 포트)
    pub port: u16,
}

impl ForwardRule {
    /// 새 규칙을 생성합니다.
    pub fn new(name: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port,
        }
    }

    /// 워크로드 식별자로부터 규칙 이름을 만듭니다.
    ///
    /// 한 워크로드의 모든 규칙은 같은 이름을 공유합니다.
    pub fn workload_rule_name(namespace: &str, name: &str) -> String {
        format!("{namespace}-{name}")
    }

    /// 어플라이언스에 생성 가능한 규칙인지 확인합니다.
    ///
    /// 주소가 비어 있으면 아직 호스트가 배정되지 않은 워크로드이므로 생성 대상이 아닙니다.
    pub fn is_routable(&self) -> bool {
        !self.address.is_empty()
    }
}

impl fmt::Display for ForwardRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.address.is_empty() {
            write!(f, "{} -> <unassigned>:{}", self.name, self.port)
        } else {
            write!(f, "{} -> {}:{}", self.name, self.address, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn equality_covers_all_fields() {
        let a = ForwardRule::new("default-web", "10.0.0.5", 80);
        assert_eq!(a, ForwardRule::new("default-web", "10.0.0.5", 80));
        assert_ne!(a, ForwardRule::new("default-web", "10.0.0.5", 81));
        assert_ne!(a, ForwardRule::new("default-web", "10.0.0.6", 80));
        assert_ne!(a, ForwardRule::new("default-api", "10.0.0.5", 80));
    }

    #[test]
    fn hash_matches_equality() {
        let mut set = HashSet::new();
        set.insert(ForwardRule::new("default-web", "10.0.0.5", 80));
        assert!(set.contains(&ForwardRule::new("default-web", "10.0.0.5", 80)));
        assert!(!set.contains(&ForwardRule::new("default-web", "10.0.0.5", 8080)));
    }

    #[test]
    fn workload_rule_name_joins_namespace_and_name() {
        assert_eq!(ForwardRule::workload_rule_name("games", "minecraft"), "games-minecraft");
    }

    #[test]
    fn empty_address_is_not_routable() {
        assert!(!ForwardRule::new("default-web", "", 80).is_routable());
        assert!(ForwardRule::new("default-web", "192.168.1.20", 80).is_routable());
    }

    #[test]
    fn display_marks_unassigned_address() {
        let rule = ForwardRule::new("default-web", "", 25565);
        assert_eq!(rule.to_string(), "default-web -> <unassigned>:25565");
        let rule = ForwardRule::new("default-web", "192.168.1.20", 25565);
        assert_eq!(rule.to_string(), "default-web -> 192.168.1.20:25565");
    }

    #[test]
    fn serializes_as_plain_object() {
        let rule = ForwardRule::new("default-web", "192.168.1.20", 80);
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["name"], "default-web");
        assert_eq!(json["address"], "192.168.1.20");
        assert_eq!(json["port"], 80);
    }
}
