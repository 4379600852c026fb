use itertools::Itertools;
use schema::{
    by_arrival, Command, DispatchError, Dispatcher, Order, PriorityWeights, Runner, ScriptError,
    PROCESS_WEIGHTS,
};

use crate::{report, DispatchScheduler};

/// Replays a scenario script against a `Dispatcher` and collects the
/// transcript, one rendered line per event
pub struct ScriptRunner {
    commands: Vec<Command>,
}

impl ScriptRunner {
    pub fn from_script_path(path: &str) -> Result<Self, ScriptError> {
        let commands = Command::from_script(path)?;
        log::info!("loaded {} commands from {}", commands.len(), path);
        Ok(Self::from_commands(commands))
    }

    pub fn from_commands(commands: Vec<Command>) -> Self {
        Self { commands }
    }

    /// Run with the process-wide priority weights
    pub fn run_with_defaults(&self) -> Result<Vec<String>, String> {
        self.run_with_weights(*PROCESS_WEIGHTS)
    }

    pub fn run_with_weights(&self, weights: PriorityWeights) -> Result<Vec<String>, String> {
        self.run(DispatchScheduler::new(weights))
    }

    fn run_inner<S: Dispatcher>(
        commands: &[Command],
        mut dispatcher: S,
    ) -> Result<Vec<String>, String> {
        if commands.is_empty() {
            return Err("No commands".to_string());
        }

        let mut transcript = vec![];

        for command in commands {
            match *command {
                Command::CreateOrder {
                    id,
                    now,
                    value,
                    flight_time,
                } => {
                    // Purging up front lets deliveries be reported even when
                    // the command itself is refused.
                    let mut delivered = dispatcher.purge_delivered(now);
                    match dispatcher.create(id, now, value, flight_time) {
                        Ok(creation) => {
                            transcript.push(report::created(&creation.created));
                            transcript.extend(report::updated(&creation.cascaded));
                            delivered.extend(creation.delivered);
                        }
                        Err(e) => log::warn!("skipping create_order({}): {}", id, e),
                    }
                    report_deliveries(&mut transcript, delivered);
                }

                Command::CancelOrder { id, now } => {
                    let mut delivered = dispatcher.purge_delivered(now);
                    match dispatcher.cancel(id, now) {
                        Ok(cancellation) => {
                            transcript.push(report::cancelled(id));
                            transcript.extend(report::updated(&cancellation.cascaded));
                            delivered.extend(cancellation.delivered);
                        }
                        Err(e @ DispatchError::TimeOverflow(_)) => {
                            log::warn!("skipping cancel_order({}): {}", id, e);
                        }
                        Err(e) => {
                            log::info!("cancel_order({}) refused: {}", id, e);
                            transcript.push(report::cannot_cancel(id));
                        }
                    }
                    report_deliveries(&mut transcript, delivered);
                }

                Command::UpdateTime {
                    id,
                    now,
                    flight_time,
                } => {
                    let mut delivered = dispatcher.purge_delivered(now);
                    match dispatcher.update_flight_time(id, now, flight_time) {
                        Ok(update) => {
                            transcript.extend(report::updated(&update.affected));
                            delivered.extend(update.delivered);
                        }
                        Err(
                            e @ (DispatchError::InvalidFlightTime(_)
                            | DispatchError::TimeOverflow(_)),
                        ) => {
                            log::warn!("skipping update_time({}): {}", id, e);
                        }
                        Err(e) => {
                            log::info!("update_time({}) refused: {}", id, e);
                            transcript.push(report::cannot_update(id));
                        }
                    }
                    report_deliveries(&mut transcript, delivered);
                }

                Command::PrintOrder { id } => {
                    if let Ok(order) = dispatcher.info(id) {
                        transcript.push(report::order_info(&order));
                    }
                }

                Command::PrintRange { from, to } => {
                    transcript.push(report::range(&dispatcher.range(from, to)));
                }

                Command::GetRankOf { id } => {
                    if dispatcher.find(id).is_some() {
                        transcript.push(report::rank(id, dispatcher.rank(id)));
                    }
                }

                Command::Quit => {
                    report_deliveries(&mut transcript, dispatcher.shutdown());
                    return Ok(transcript);
                }
            }
        }

        log::warn!("script ended without quit(), delivering remaining orders");
        report_deliveries(&mut transcript, dispatcher.shutdown());
        Ok(transcript)
    }
}

fn report_deliveries(transcript: &mut Vec<String>, delivered: Vec<Order>) {
    transcript.extend(
        delivered
            .iter()
            .sorted_by_key(|order| by_arrival(order))
            .map(report::delivered),
    );
}

impl<S: Dispatcher> Runner<S> for ScriptRunner {
    /// Rendered transcript
    type Success = Vec<String>;
    /// Description of what went wrong
    type Error = String;

    fn run(&self, dispatcher: S) -> Result<Self::Success, Self::Error> {
        Self::run_inner(&self.commands, dispatcher)
    }
}
