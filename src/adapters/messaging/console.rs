use crate::ports::messaging::{Error, MessagingPort};
use std::io::Write;

/// Outbound gateway printing replies to standard output
///
/// Used by the local console runner in place of the messaging channel.
#[derive(Clone, Debug, Default)]
pub struct ConsoleMessaging;

#[async_trait::async_trait]
impl MessagingPort for ConsoleMessaging {
    async fn send(&self, to: &str, text: &str) -> Result<(), Error> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "[to {to}]")
            .and_then(|_| writeln!(stdout, "{text}"))
            .and_then(|_| stdout.flush())
            .map_err(|err| Error::Adapter(Box::new(err)))
    }
}
