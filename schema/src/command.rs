use crate::{OrderId, ScriptError, Time};

/// A single line of a scenario script
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// `create_order(id, now, value, flight_time)`
    CreateOrder {
        id: OrderId,
        now: Time,
        value: u64,
        flight_time: Time,
    },
    /// `cancel_order(id, now)`
    CancelOrder { id: OrderId, now: Time },
    /// `update_time(id, now, new_flight_time)`
    UpdateTime {
        id: OrderId,
        now: Time,
        flight_time: Time,
    },
    /// `print_order(id)`
    PrintOrder { id: OrderId },
    /// `print_range(from, to)`
    PrintRange { from: Time, to: Time },
    /// `get_rank_of(id)`
    GetRankOf { id: OrderId },
    /// `quit()`
    Quit,
}

impl Command {
    /// Loads every command of a script, skipping blank lines and `#` comments
    pub fn from_script(path: &str) -> Result<Vec<Self>, ScriptError> {
        let script = std::fs::read_to_string(path)?;
        Self::parse_script(&script)
    }

    pub fn parse_script(script: &str) -> Result<Vec<Self>, ScriptError> {
        script
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
            .map(|(line_number, line)| Self::parse_line(line_number, line))
            .collect()
    }

    fn parse_line(line: usize, text: &str) -> Result<Self, ScriptError> {
        let unknown = || ScriptError::UnknownCommand {
            line,
            command: text.to_string(),
        };

        let (name, rest) = text.split_once('(').ok_or_else(unknown)?;
        let arguments = rest.trim_end().strip_suffix(')').ok_or_else(unknown)?;
        let name = name.trim();
        let args = Arguments::split(line, name, arguments);

        let command = match name {
            "create_order" => {
                let [id, now, value, flight_time] = args.take::<4>()?;
                Self::CreateOrder {
                    id: args.id(id)?,
                    now: args.time(now)?,
                    value: args.value(value)?,
                    flight_time: args.time(flight_time)?,
                }
            }
            "cancel_order" => {
                let [id, now] = args.take::<2>()?;
                Self::CancelOrder {
                    id: args.id(id)?,
                    now: args.time(now)?,
                }
            }
            "update_time" => {
                let [id, now, flight_time] = args.take::<3>()?;
                Self::UpdateTime {
                    id: args.id(id)?,
                    now: args.time(now)?,
                    flight_time: args.time(flight_time)?,
                }
            }
            "print_order" => {
                let [id] = args.take::<1>()?;
                Self::PrintOrder { id: args.id(id)? }
            }
            "print_range" => {
                let [from, to] = args.take::<2>()?;
                Self::PrintRange {
                    from: args.time(from)?,
                    to: args.time(to)?,
                }
            }
            "get_rank_of" => {
                let [id] = args.take::<1>()?;
                Self::GetRankOf { id: args.id(id)? }
            }
            "quit" => {
                args.take::<0>()?;
                Self::Quit
            }
            _ => return Err(unknown()),
        };

        Ok(command)
    }
}

impl<'a> TryFrom<&'a str> for Command {
    type Error = ScriptError;

    fn try_from(s: &'a str) -> Result<Self, Self::Error> {
        Self::parse_line(1, s.trim())
    }
}

/// Comma-separated arguments of one command, with their source line
struct Arguments<'a> {
    line: usize,
    command: &'a str,
    values: Vec<&'a str>,
}

impl<'a> Arguments<'a> {
    fn split(line: usize, command: &'a str, arguments: &'a str) -> Self {
        let values = match arguments.trim() {
            "" => Vec::new(),
            arguments => arguments.split(',').map(str::trim).collect(),
        };

        Self {
            line,
            command,
            values,
        }
    }

    fn take<const N: usize>(&self) -> Result<[&'a str; N], ScriptError> {
        <[&str; N]>::try_from(self.values.as_slice()).map_err(|_| ScriptError::Arity {
            line: self.line,
            command: self.command.to_string(),
            expected: N,
            found: self.values.len(),
        })
    }

    fn invalid(&self, argument: &str) -> ScriptError {
        ScriptError::InvalidArgument {
            line: self.line,
            argument: argument.to_string(),
        }
    }

    fn id(&self, raw: &str) -> Result<OrderId, ScriptError> {
        raw.parse::<u64>()
            .map(OrderId)
            .map_err(|_| self.invalid(raw))
    }

    fn time(&self, raw: &str) -> Result<Time, ScriptError> {
        raw.parse::<Time>().map_err(|_| self.invalid(raw))
    }

    fn value(&self, raw: &str) -> Result<u64, ScriptError> {
        raw.parse::<u64>().map_err(|_| self.invalid(raw))
    }
}
