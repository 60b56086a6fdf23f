// BusProbe - RS485 Modbus RTU diagnostic tool
use busprobe::cli::args::Args;
use busprobe::cli::commands::execute_command;
use busprobe::cli::output::{ConsoleWriter, OutputWriter};
use clap::Parser;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();
    let writer = ConsoleWriter::new(args.output);

    if let Err(e) = execute_command(args).await {
        if writer.write_error(&e.to_string()).is_err() {
            eprintln!("Error: {}", e);
        }
        std::process::exit(1);
    }
}
