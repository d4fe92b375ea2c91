use prioeval::{Evaluator, SharedVariables};
use std::io::{self, BufRead, Write};

fn main() -> io::Result<()> {
    pretty_env_logger::init();

    let mut evaluator = Evaluator::new(SharedVariables::new());
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match evaluator.evaluate(line) {
            Ok(value) => writeln!(stdout, "{value}")?,
            Err(err) => writeln!(stdout, "error: {err}")?,
        }
    }

    Ok(())
}
