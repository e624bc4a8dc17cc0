//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 레코더가 설치되지 않은 경우 `metrics` 매크로 호출은 아무 일도 하지 않습니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `baniq_`
//! - 접미어: `_total` (counter), `_seconds` (gauge, 시간), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 컨테이너 이벤트 액션 레이블 키 (start, stop, die, destroy)
pub const LABEL_ACTION: &str = "action";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

// ─── Jail Manager 메트릭 ────────────────────────────────────────────

/// 생성된 감옥 파일 수 (counter)
pub const JAILS_ADDED_TOTAL: &str = "baniq_jails_added_total";

/// 삭제된 감옥 파일 수 (counter)
pub const JAILS_REMOVED_TOTAL: &str = "baniq_jails_removed_total";

/// 생성된 커스텀 필터 파일 수 (counter)
pub const FILTERS_WRITTEN_TOTAL: &str = "baniq_filters_written_total";

/// fail2ban 리로드 시도 수 (counter, label: result)
pub const RELOADS_TOTAL: &str = "baniq_reloads_total";

/// 처리된 컨테이너 이벤트 수 (counter, label: action)
pub const EVENTS_PROCESSED_TOTAL: &str = "baniq_events_processed_total";

/// 이벤트 처리 실패 수 (counter)
pub const EVENT_ERRORS_TOTAL: &str = "baniq_event_errors_total";

/// 감옥을 소유한 컨테이너 수 (gauge)
pub const TRACKED_CONTAINERS: &str = "baniq_tracked_containers";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// 데몬 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "baniq_daemon_uptime_seconds";

/// 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "baniq_daemon_build_info";

/// 모든 메트릭의 설명을 등록합니다.
///
/// 레코더 설치 직후 한 번 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(
        JAILS_ADDED_TOTAL,
        "Total number of jail files written for containers"
    );
    describe_counter!(
        JAILS_REMOVED_TOTAL,
        "Total number of jail files removed for stopped containers"
    );
    describe_counter!(
        FILTERS_WRITTEN_TOTAL,
        "Total number of inline filter files generated"
    );
    describe_counter!(
        RELOADS_TOTAL,
        "fail2ban reload invocations by result (success, failure)"
    );
    describe_counter!(
        EVENTS_PROCESSED_TOTAL,
        "Container lifecycle events handled, by action"
    );
    describe_counter!(
        EVENT_ERRORS_TOTAL,
        "Container lifecycle events whose handling failed"
    );
    describe_gauge!(
        TRACKED_CONTAINERS,
        "Number of containers currently owning jail files"
    );
    describe_gauge!(DAEMON_UPTIME_SECONDS, "Daemon uptime in seconds");
    describe_gauge!(DAEMON_BUILD_INFO, "Build information (always 1)");
}
