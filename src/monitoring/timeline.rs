//! Execution Timeline
//!
//! Tracks step start/end times for run summaries and Gantt charts.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::execution::step::{StepResult, StepStatus};

/// Type of timeline event.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Step started executing
    Started,
    /// Step finished with a result
    Completed,
    /// Step failed
    Failed,
    /// Step did not run
    Skipped,
}

/// A single event in the execution timeline.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TimelineEvent {
    pub step_number: u32,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
}

/// Tracks the execution timeline of a run.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ExecutionTimeline {
    events: Vec<TimelineEvent>,
    start_time: DateTime<Utc>,
}

impl ExecutionTimeline {
    /// Creates a new timeline starting now.
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(start_time: DateTime<Utc>) -> Self {
        Self {
            events: Vec::new(),
            start_time,
        }
    }

    /// Records an event for a step.
    pub fn add_event(&mut self, step_number: u32, event_type: EventType, timestamp: DateTime<Utc>) {
        self.events.push(TimelineEvent {
            step_number,
            event_type,
            timestamp,
        });
    }

    /// Records the start and end events of a finished step.
    pub fn record(&mut self, result: &StepResult) {
        if result.attempts == 0 {
            let event = match result.status {
                StepStatus::Failed => EventType::Failed,
                _ => EventType::Skipped,
            };
            self.add_event(result.step_number, event, result.finished_at);
            return;
        }

        self.add_event(result.step_number, EventType::Started, result.started_at);
        let end = match result.status {
            StepStatus::Completed | StepStatus::CompletedWithFallback => EventType::Completed,
            StepStatus::Failed => EventType::Failed,
            StepStatus::Skipped => EventType::Skipped,
        };
        self.add_event(result.step_number, end, result.finished_at);
    }

    /// Returns all recorded events.
    pub fn get_events(&self) -> &[TimelineEvent] {
        &self.events
    }

    fn offset_ms(&self, at: DateTime<Utc>) -> i64 {
        (at - self.start_time).num_milliseconds().max(0)
    }

    /// Returns step durations in milliseconds.
    pub fn get_durations(&self) -> BTreeMap<u32, i64> {
        let mut starts: BTreeMap<u32, i64> = BTreeMap::new();
        let mut durations = BTreeMap::new();

        for event in &self.events {
            let elapsed = self.offset_ms(event.timestamp);
            match event.event_type {
                EventType::Started => {
                    starts.insert(event.step_number, elapsed);
                }
                EventType::Completed | EventType::Failed | EventType::Skipped => {
                    if let Some(start) = starts.get(&event.step_number) {
                        durations.insert(event.step_number, elapsed - start);
                    }
                }
            }
        }

        durations
    }

    /// Generates an ASCII Gantt chart.
    ///
    /// Each step is a bar scaled to 50 characters of total run time;
    /// skipped steps are listed without a bar.
    pub fn gantt_chart(&self) -> String {
        let mut output = String::from("\nExecution Timeline:\n\n");

        let total_time = self
            .events
            .iter()
            .map(|e| self.offset_ms(e.timestamp))
            .max()
            .unwrap_or(0);

        let mut spans: BTreeMap<u32, (i64, i64)> = BTreeMap::new();
        let mut skipped = Vec::new();
        for event in &self.events {
            let elapsed = self.offset_ms(event.timestamp);
            match event.event_type {
                EventType::Started => {
                    spans.insert(event.step_number, (elapsed, elapsed));
                }
                EventType::Completed | EventType::Failed => {
                    if let Some(span) = spans.get_mut(&event.step_number) {
                        span.1 = elapsed;
                    }
                }
                EventType::Skipped => {
                    spans.remove(&event.step_number);
                    if !skipped.contains(&event.step_number) {
                        skipped.push(event.step_number);
                    }
                }
            }
        }

        let scale = if total_time > 0 { 50.0 / total_time as f64 } else { 0.0 };
        let mut sorted: Vec<_> = spans.into_iter().collect();
        sorted.sort_by_key(|(step, (start, _))| (*start, *step));

        for (step, (start, end)) in sorted {
            let start_pos = (start as f64 * scale) as usize;
            let width = ((end - start) as f64 * scale).max(1.0) as usize;
            output.push_str(&format!(
                "{:<8} |{}{}| ({} ms)\n",
                format!("step{}", step),
                " ".repeat(start_pos),
                "#".repeat(width),
                end - start
            ));
        }
        for step in skipped {
            output.push_str(&format!("{:<8} | skipped\n", format!("step{}", step)));
        }

        output.push_str(&format!("\nTotal: {} ms\n", total_time));
        output
    }
}

impl Default for ExecutionTimeline {
    fn default() -> Self {
        Self::new()
    }
}
