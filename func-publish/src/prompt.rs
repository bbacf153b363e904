//! Interactive conflict prompt over a reader/writer pair (stdin/stdout in the binary).

use std::io::{self, BufRead, Write};

use func_publish_core::reconcile::ConflictPrompt;
use func_publish_core::settings::LOCAL_SETTINGS_FILE;

pub const QUESTION: &str = "Would you like to overwrite value in azure? [yes/no/show]";

pub struct TerminalPrompt<R, W> {
    input: R,
    output: W,
    current_key: Option<String>,
}

impl<R: BufRead, W: Write> TerminalPrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        TerminalPrompt {
            input,
            output,
            current_key: None,
        }
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

impl TerminalPrompt<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        TerminalPrompt::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> ConflictPrompt for TerminalPrompt<R, W> {
    fn ask(&mut self, key: &str, _: &str, _: &str) -> io::Result<Option<String>> {
        if self.current_key.as_deref() != Some(key) {
            writeln!(
                self.output,
                "App setting {key} is different between azure and {LOCAL_SETTINGS_FILE}"
            )?;
            self.current_key = Some(key.to_string());
        }
        writeln!(self.output, "{QUESTION}")?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    fn reveal(&mut self, _: &str, remote_value: &str, local_value: &str) -> io::Result<()> {
        writeln!(self.output, "Azure: {remote_value}")?;
        writeln!(self.output, "Locally: {local_value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use func_publish_core::reconcile::merge;
    use func_publish_core::settings::SettingsMap;

    #[test]
    fn show_prints_both_values_then_asks_again() {
        let remote: SettingsMap = [("Mode", "slow")].into_iter().collect();
        let local: SettingsMap = [("Mode", "fast")].into_iter().collect();
        let mut prompt = TerminalPrompt::new(&b"show\nyes\n"[..], Vec::new());

        let merged = merge(&remote, &local, false, &mut prompt).unwrap();
        assert_eq!(merged.get("Mode"), Some("fast"));

        let out = String::from_utf8(prompt.into_output()).unwrap();
        assert_eq!(
            out,
            "App setting Mode is different between azure and local.settings.json\n\
             Would you like to overwrite value in azure? [yes/no/show]\n\
             Azure: slow\n\
             Locally: fast\n\
             Would you like to overwrite value in azure? [yes/no/show]\n"
        );
    }

    #[test]
    fn closed_input_is_end_of_input() {
        let mut prompt = TerminalPrompt::new(&b""[..], Vec::new());
        assert_eq!(prompt.ask("A", "1", "2").unwrap(), None);
    }
}
