use std::time::Duration;

use malstack_encoding::{Time, Uri};
use malstack_message::{body_part, HeaderFields, Message, MessageBody, QosProperties};
use malstack_transport::{Endpoint, GenericTransport};
use tracing::debug;

use crate::cmd::SendArgs;
use crate::exit::{
    construction_error, transmit_code, transport_error, CliError, CliResult, SUCCESS, USAGE,
};
use crate::output::{print_outcomes, OutputFormat, SendOutcome};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let transaction_ids = (0..args.count)
        .map(|i| transaction_id_for(args.transaction_id, i))
        .collect::<CliResult<Vec<_>>>()?;
    let mut config = args.transport.resolve()?;
    config.delivery_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));

    let transport = GenericTransport::new(format!("malcli://{}", std::process::id()), config)
        .map_err(|err| transport_error("transport setup failed", err))?;
    transport
        .connect_uds(args.to.as_str(), &args.path)
        .map_err(|err| transport_error("connect failed", err))?;
    let endpoint = transport
        .create_endpoint(&args.from)
        .map_err(|err| transport_error("endpoint setup failed", err))?;

    let messages = transaction_ids
        .into_iter()
        .map(|tid| build_message(&endpoint, &args, tid))
        .collect::<CliResult<Vec<_>>>()?;
    debug!(count = messages.len(), to = %args.to, batch = args.batch, "sending");

    let mut code = SUCCESS;
    let outcomes = if args.batch {
        let failures = match endpoint.send_batch(&messages) {
            Ok(()) => Vec::new(),
            Err(err) => err.errors,
        };
        if let Some(first) = failures.first() {
            code = transmit_code(first);
        }
        messages
            .iter()
            .map(|message| {
                let tid = message.header().transaction_id();
                match failures
                    .iter()
                    .find(|err| err.message().map(|m| m.header().transaction_id()) == Some(tid))
                {
                    Some(err) => SendOutcome::failed(tid, &args.to, err),
                    None => SendOutcome::delivered(tid, &args.to),
                }
            })
            .collect::<Vec<_>>()
    } else {
        let mut outcomes = Vec::with_capacity(messages.len());
        for message in &messages {
            let tid = message.header().transaction_id();
            match endpoint.send(message) {
                Ok(()) => outcomes.push(SendOutcome::delivered(tid, &args.to)),
                Err(err) => {
                    if code == SUCCESS {
                        code = transmit_code(&err);
                    }
                    outcomes.push(SendOutcome::failed(tid, &args.to, &err));
                }
            }
        }
        outcomes
    };

    print_outcomes(&outcomes, format);
    transport.close();
    Ok(code)
}

fn build_message(endpoint: &Endpoint, args: &SendArgs, transaction_id: i64) -> CliResult<Message> {
    let body = MessageBody::Parts(args.text.iter().cloned().map(body_part).collect());
    endpoint
        .create_message(
            HeaderFields {
                uri_to: Uri::new(args.to.as_str()),
                timestamp: Time::now(),
                transaction_id,
                ..HeaderFields::default()
            },
            body,
            QosProperties::new(),
        )
        .map_err(|err| construction_error("message construction failed", err))
}

/// Transaction id of the `index`th message in a run starting at `first`.
fn transaction_id_for(first: i64, index: u32) -> CliResult<i64> {
    first.checked_add(i64::from(index)).ok_or_else(|| {
        CliError::new(
            USAGE,
            format!("transaction id {first} plus {index} overflows a signed 64-bit value"),
        )
    })
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(num) => (num, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn transaction_ids_near_the_limit() {
        assert_eq!(transaction_id_for(i64::MAX - 1, 1).unwrap(), i64::MAX);
        assert_eq!(transaction_id_for(-5, 3).unwrap(), -2);

        let err = transaction_id_for(i64::MAX - 1, 2).unwrap_err();
        assert_eq!(err.code, USAGE);
    }
}
