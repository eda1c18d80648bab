//! 워크로드 레코드에서 원하는 포워딩 규칙 계산

use portfwd_core::types::ForwardRule;
use tracing::warn;

use crate::workload::WorkloadRecord;

/// 워크로드가 원하는 포워딩 규칙 집합을 계산합니다.
///
/// 호스트 포트가 지정된 컨테이너 포트만 포함합니다. 호스트 IP가 아직 없으면
/// 주소가 빈 규칙을 만들며, 이런 규칙은 stale 판정에만 쓰이고 생성되지 않습니다.
///
/// 한 워크로드의 규칙은 모두 같은 이름(`<namespace>-<name>`)을 가집니다.
pub fn desired_rules(record: &WorkloadRecord) -> Vec<ForwardRule> {
    let name = ForwardRule::workload_rule_name(&record.namespace, &record.name);
    let address = record.host_ip.clone().unwrap_or_default();

    record
        .ports
        .iter()
        .filter_map(|decl| {
            let host_port = decl.host_port.filter(|p| *p != 0)?;
            match u16::try_from(host_port) {
                Ok(port) if port > 0 => Some(ForwardRule::new(name.clone(), address.clone(), port)),
                _ => {
                    warn!(
                        workload = %record.key(),
                        container = %decl.container,
                        container_port = decl.container_port,
                        protocol = %decl.protocol,
                        host_port,
                        "host port out of range, skipping"
                    );
                    None
                }
            }
        })
        .collect()
}
