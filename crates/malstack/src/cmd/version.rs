use malstack_encoding::WireFormat;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("malstack {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    let encodings: Vec<_> = WireFormat::ALL.iter().map(|format| format.name).collect();
    println!("name: malstack");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("MALSTACK_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("encodings: {}", encodings.join(", "));

    Ok(SUCCESS)
}
