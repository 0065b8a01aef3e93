use bytes::{Bytes, BytesMut};
use malstack_message::Message;
use malstack_transport::frame::decode_frame;

use crate::cmd::DecodeArgs;
use crate::exit::{
    construction_error, encoding_error, frame_error, CliError, CliResult, DATA_INVALID, SUCCESS,
};
use crate::output::{print_message, MessageSummary, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.transport.resolve()?;
    let factory = config.stream_factory().map_err(encoding_error)?;

    let payload = parse_input(&args.hex, args.framed, config.max_payload_size)?;
    let message = Message::decode(&factory, payload, config.wrap_body_parts)
        .map_err(|err| construction_error("decode failed", err))?;

    print_message(&MessageSummary::new(&message, &factory), format);
    Ok(SUCCESS)
}

fn parse_input(hex_input: &str, framed: bool, max_payload: usize) -> CliResult<Bytes> {
    let cleaned: String = hex_input.chars().filter(|c| !c.is_whitespace()).collect();
    let raw = hex::decode(&cleaned)
        .map_err(|err| CliError::new(DATA_INVALID, format!("invalid hex input: {err}")))?;
    if !framed {
        return Ok(Bytes::from(raw));
    }

    let mut buf = BytesMut::from(raw.as_slice());
    let payload = decode_frame(&mut buf, max_payload)
        .map_err(|err| frame_error("frame decode failed", err))?
        .ok_or_else(|| CliError::new(DATA_INVALID, "incomplete frame"))?;
    if !buf.is_empty() {
        return Err(CliError::new(
            DATA_INVALID,
            format!("{} trailing bytes after frame", buf.len()),
        ));
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_is_ignored() {
        let payload = parse_input("01 02\n03", false, 16).unwrap();
        assert_eq!(payload.as_ref(), &[1, 2, 3]);
    }

    #[test]
    fn framed_input_is_unwrapped() {
        let payload = parse_input("4d4f 02000000 abcd", true, 16).unwrap();
        assert_eq!(payload.as_ref(), &[0xAB, 0xCD]);
    }

    #[test]
    fn bad_input_is_data_invalid() {
        assert_eq!(parse_input("zz", false, 16).unwrap_err().code, DATA_INVALID);
        assert_eq!(parse_input("4d4f0400", true, 16).unwrap_err().code, DATA_INVALID);
        assert_eq!(
            parse_input("4d4f 01000000 aa bb", true, 16).unwrap_err().code,
            DATA_INVALID
        );
    }
}
