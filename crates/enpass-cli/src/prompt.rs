//! Terminal prompts for the master password and PIN.

use enpass_vault::Prompter;
use zeroize::Zeroizing;

/// Reads secrets from the controlling terminal with echo disabled.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn read_secret(&mut self, prompt: &str) -> std::io::Result<Zeroizing<String>> {
        rpassword::prompt_password(prompt).map(Zeroizing::new)
    }
}
