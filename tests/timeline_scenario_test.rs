// ==========================================
// 时间轴场景测试
// ==========================================
// 测试范围:
// 1. 班次窗口内的比例位置
// 2. 跨生产日仍在进行的停机（裁剪到窗口起点）
// 3. 第三班跨零点
// 4. 多资源排序与可用率
// ==========================================

mod helpers;

use helpers::{ts, DowntimeBuilder, MemoryStore};
use mes_downtime_core::api::{ActorContext, DowntimeApi};
use mes_downtime_core::domain::types::{ProductionDay, Shift};
use mes_downtime_core::engine::{production_day_of, shift_of, window_of};
use mes_downtime_core::services::ManualClock;
use mes_downtime_core::{EngineConfig, ReasonCatalog};
use chrono::NaiveDate;
use std::sync::Arc;

const EPS: f64 = 1e-9;

fn setup(now: chrono::NaiveDateTime) -> (Arc<ManualClock>, DowntimeApi) {
    let clock = Arc::new(ManualClock::new(now));
    let api = DowntimeApi::new(
        Arc::new(MemoryStore::new()),
        &EngineConfig::default(),
        Arc::new(ReasonCatalog::builtin()),
        clock.clone(),
        ActorContext::new("supervisor"),
    );
    (clock, api)
}

fn day(d: u32) -> ProductionDay {
    ProductionDay::new(NaiveDate::from_ymd_opt(2026, 3, d).unwrap())
}

#[tokio::test]
async fn test_first_shift_segment_position() {
    let (_clock, api) = setup(ts(2, 8, 0));
    api.start_downtime(
        DowntimeBuilder::new("H07", ts(2, 7, 10))
            .ended_at(ts(2, 7, 55))
            .build(),
    )
    .await
    .unwrap();

    let timeline = api
        .timeline_for("H07", day(2), Some(Shift::First))
        .await
        .unwrap();

    assert_eq!(timeline.segments.len(), 1);
    let segment = &timeline.segments[0];
    assert!((segment.offset_fraction - 40.0 / 510.0).abs() < EPS);
    assert!((segment.width_fraction - 45.0 / 510.0).abs() < EPS);
    assert!(!segment.clipped);
    assert!(!segment.active);
    assert_eq!(timeline.stopped_minutes, 45);
    assert!((timeline.availability - 465.0 / 510.0).abs() < EPS);

    // 第二班窗口内不可见
    let second = api
        .timeline_for("H07", day(2), Some(Shift::Second))
        .await
        .unwrap();
    assert!(second.segments.is_empty());
    assert!((second.availability - 1.0).abs() < EPS);
}

#[tokio::test]
async fn test_active_downtime_from_previous_day_is_clipped() {
    let (clock, api) = setup(ts(1, 22, 0));
    api.start_downtime(
        DowntimeBuilder::new("H12", ts(1, 22, 0))
            .reason("MANUTENÇÃO CORRETIVA")
            .build(),
    )
    .await
    .unwrap();

    clock.set(ts(2, 7, 0));
    let timeline = api.timeline_for("H12", day(2), None).await.unwrap();

    assert_eq!(timeline.segments.len(), 1);
    let segment = &timeline.segments[0];
    assert!(segment.clipped);
    assert!(segment.active);
    assert!(segment.offset_fraction.abs() < EPS);
    assert!((segment.width_fraction - 30.0 / 1440.0).abs() < EPS);
    assert_eq!(segment.visible_minutes, 30);
}

#[tokio::test]
async fn test_finished_downtime_from_previous_day_is_clipped() {
    let (_clock, api) = setup(ts(2, 8, 0));
    let record = api
        .start_downtime(
            DowntimeBuilder::new("H07", ts(2, 6, 0))
                .reason("MANUTENÇÃO CORRETIVA")
                .ended_at(ts(2, 7, 0))
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(record.production_day, day(1));

    let timeline = api
        .timeline_for("H07", day(2), Some(Shift::First))
        .await
        .unwrap();
    assert_eq!(timeline.segments.len(), 1);
    let segment = &timeline.segments[0];
    assert!(segment.clipped);
    assert!(!segment.active);
    assert!(segment.offset_fraction.abs() < EPS);
    assert!((segment.width_fraction - 30.0 / 510.0).abs() < EPS);
    assert_eq!(timeline.stopped_minutes, 30);
    assert!((timeline.availability - 480.0 / 510.0).abs() < EPS);

    // 前一生产日的第三班窗口里同样可见
    let previous = api
        .timeline_for("H07", day(1), Some(Shift::Third))
        .await
        .unwrap();
    assert_eq!(previous.stopped_minutes, 30);
}

#[tokio::test]
async fn test_long_weekend_stop_reaches_later_day() {
    let (_clock, api) = setup(ts(3, 12, 0));
    api.start_downtime(
        DowntimeBuilder::new("H09", ts(1, 8, 0))
            .reason("SEM PROGRAMAÇÃO-FIM DE SEMANA")
            .ended_at(ts(3, 8, 0))
            .build(),
    )
    .await
    .unwrap();

    let timeline = api.timeline_for("H09", day(3), None).await.unwrap();
    assert_eq!(timeline.segments.len(), 1);
    assert_eq!(timeline.stopped_minutes, 90);
}

#[test]
fn test_third_shift_after_midnight_belongs_to_previous_day() {
    let t = ts(3, 0, 30);
    assert_eq!(production_day_of(t), day(2));
    assert_eq!(shift_of(t), Shift::Third);

    let window = window_of(Shift::Third, day(2));
    assert_eq!(window.start, ts(2, 23, 20));
    assert_eq!(window.end, ts(3, 6, 30));
    assert!(window.crosses_midnight());
}

#[tokio::test]
async fn test_third_shift_downtime_across_midnight() {
    let (_clock, api) = setup(ts(3, 2, 0));
    let record = api
        .start_downtime(
            DowntimeBuilder::new("H03", ts(2, 23, 50))
                .reason("SEM PROGRAMAÇÃO")
                .ended_at(ts(3, 0, 30))
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(record.production_day, day(2));
    assert_eq!(record.shift, Shift::Third);
    assert_eq!(record.duration_minutes, Some(40));

    let timeline = api
        .timeline_for("H03", day(2), Some(Shift::Third))
        .await
        .unwrap();
    let segment = &timeline.segments[0];
    assert!((segment.offset_fraction - 30.0 / 430.0).abs() < EPS);
    assert!((segment.width_fraction - 40.0 / 430.0).abs() < EPS);
}

#[tokio::test]
async fn test_timelines_for_day_sorted_by_resource_number() {
    let (_clock, api) = setup(ts(2, 12, 0));
    for (resource, start, end) in [
        ("H10", ts(2, 8, 0), ts(2, 8, 30)),
        ("H2", ts(2, 9, 0), ts(2, 9, 10)),
    ] {
        api.start_downtime(DowntimeBuilder::new(resource, start).ended_at(end).build())
            .await
            .unwrap();
    }

    let resources = vec!["H01".to_string(), "H10".to_string()];
    let timelines = api
        .timelines_for_day(&resources, day(2), Some(Shift::First))
        .await
        .unwrap();

    let ids: Vec<&str> = timelines.iter().map(|t| t.resource_id.as_str()).collect();
    assert_eq!(ids, vec!["H01", "H02", "H10"]);
    assert!(timelines[0].segments.is_empty());
    assert_eq!(timelines[1].stopped_minutes, 10);
    assert_eq!(timelines[2].stopped_minutes, 30);
}

#[tokio::test]
async fn test_tiny_downtime_stays_visible() {
    let (_clock, api) = setup(ts(2, 12, 0));
    api.start_downtime(
        DowntimeBuilder::new("H05", ts(2, 10, 0))
            .ended_at(ts(2, 10, 1))
            .build(),
    )
    .await
    .unwrap();

    let timeline = api.timeline_for("H05", day(2), None).await.unwrap();
    let segment = &timeline.segments[0];
    assert!(segment.width_fraction >= 0.005 - EPS);
    assert!(segment.offset_fraction + segment.width_fraction <= 1.0 + EPS);
}

#[tokio::test]
async fn test_minutes_by_shift_for_long_stop() {
    let (_clock, api) = setup(ts(3, 12, 0));
    api.start_downtime(
        DowntimeBuilder::new("H04", ts(2, 14, 0))
            .reason("MANUTENÇÃO CORRETIVA")
            .ended_at(ts(2, 16, 0))
            .build(),
    )
    .await
    .unwrap();

    let minutes = api.minutes_by_shift(day(2)).await.unwrap();
    assert_eq!(minutes.len(), 3);
    assert_eq!(minutes[&Shift::First], 60);
    assert_eq!(minutes[&Shift::Second], 60);
    assert_eq!(minutes[&Shift::Third], 0);
}

#[tokio::test]
async fn test_consolidated_for_day_merges_adjacent_records() {
    let (_clock, api) = setup(ts(2, 12, 0));
    for (start, end) in [(ts(2, 9, 0), ts(2, 9, 30)), (ts(2, 9, 33), ts(2, 10, 0))] {
        api.start_downtime(
            DowntimeBuilder::new("H05", start)
                .reason("MANUTENÇÃO CORRETIVA")
                .ended_at(end)
                .build(),
        )
        .await
        .unwrap();
    }
    api.start_downtime(
        DowntimeBuilder::new("H05", ts(2, 10, 30))
            .reason("SEM PROGRAMAÇÃO")
            .ended_at(ts(2, 10, 45))
            .build(),
    )
    .await
    .unwrap();

    let events = api.consolidated_for_day(day(2)).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].record_ids.len(), 2);
    assert_eq!(events[0].start, ts(2, 9, 0));
    assert_eq!(events[0].end, ts(2, 10, 0));
    assert_eq!(events[0].duration_minutes, 57);
    assert_eq!(events[1].duration_minutes, 15);
}
