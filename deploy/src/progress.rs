use std::{
    future::Future,
    io::{self, IsTerminal, Stdout, Write},
    sync::Mutex,
    time::Duration,
};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

pub trait Progress {
    fn on_start(&self, message: &str);

    fn on_end(&self, message: &str);

    fn on_abort(&self) {}
}

pub async fn with_progress<P, F, T, E>(
    progress: &P,
    operation: F,
    loading: &str,
    end: &str,
) -> Result<T, E>
where
    P: Progress + ?Sized,
    F: Future<Output = Result<T, E>>,
{
    progress.on_start(loading);
    let result = operation.await;
    match &result {
        Ok(_) => progress.on_end(end),
        Err(_) => progress.on_abort(),
    }
    result
}

/// Spinner on a terminal, plain lines when stdout is piped.
pub fn stdout_progress() -> Box<dyn Progress> {
    if io::stdout().is_terminal() {
        Box::new(Spinner::default())
    } else {
        Box::new(Lines::stdout())
    }
}

pub struct Spinner {
    bar: Mutex<Option<ProgressBar>>,
    target: Box<dyn Fn() -> ProgressDrawTarget + Send + Sync>,
}

impl Default for Spinner {
    fn default() -> Self {
        Self::with_target(ProgressDrawTarget::stdout)
    }
}

impl Spinner {
    pub fn with_target<T>(target: T) -> Self
    where
        T: Fn() -> ProgressDrawTarget + Send + Sync + 'static,
    {
        Self {
            bar: Mutex::new(None),
            target: Box::new(target),
        }
    }

    fn take(&self) -> Option<ProgressBar> {
        self.bar.lock().ok().and_then(|mut bar| bar.take())
    }
}

impl Progress for Spinner {
    fn on_start(&self, message: &str) {
        let bar = ProgressBar::with_draw_target(None, (self.target)());
        bar.set_style(ProgressStyle::default_spinner());
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(previous) = slot.replace(bar) {
                previous.finish();
            }
        }
    }

    // the loading line stays on screen in both cases
    fn on_end(&self, message: &str) {
        if let Some(bar) = self.take() {
            bar.finish();
        }
        println!();
        println!("{}", message);
    }

    fn on_abort(&self) {
        if let Some(bar) = self.take() {
            bar.abandon();
        }
    }
}

pub struct Lines<W> {
    out: Mutex<W>,
}

impl<W: Write> Lines<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    fn line(&self, message: &str) {
        if let Ok(mut out) = self.out.lock() {
            if let Err(e) = writeln!(out, "{}", message).and_then(|_| out.flush()) {
                log::warn!("failed to write progress: {}", e);
            }
        }
    }
}

impl Lines<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Progress for Lines<W> {
    fn on_start(&self, message: &str) {
        self.line(message);
    }

    fn on_end(&self, message: &str) {
        self.line(message);
    }
}

#[cfg(test)]
pub mod tests {
    use indicatif::InMemoryTerm;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Event {
        Start(String),
        End(String),
        Abort,
    }

    #[derive(Default)]
    pub struct Recorder {
        events: Mutex<Vec<Event>>,
    }

    impl Recorder {
        pub fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    impl Progress for Recorder {
        fn on_start(&self, message: &str) {
            self.events.lock().unwrap().push(Event::Start(message.to_string()));
        }

        fn on_end(&self, message: &str) {
            self.events.lock().unwrap().push(Event::End(message.to_string()));
        }

        fn on_abort(&self) {
            self.events.lock().unwrap().push(Event::Abort);
        }
    }

    #[derive(Debug, PartialEq)]
    struct OpaqueError(u32);

    #[tokio::test]
    async fn returns_value_unchanged() {
        let recorder = Recorder::default();
        let value = vec!["KT1abc".to_string(), "o1".to_string()];
        let result = with_progress(
            &recorder,
            async { Ok::<_, OpaqueError>(value.clone()) },
            "loading",
            "done",
        )
        .await;

        assert_eq!(result, Ok(value));
        assert_eq!(
            recorder.events(),
            vec![Event::Start("loading".into()), Event::End("done".into())]
        );
    }

    #[tokio::test]
    async fn returns_error_unchanged() {
        let recorder = Recorder::default();
        let result: Result<(), _> =
            with_progress(&recorder, async { Err(OpaqueError(42)) }, "loading", "done").await;

        assert_eq!(result, Err(OpaqueError(42)));
        assert_eq!(
            recorder.events(),
            vec![Event::Start("loading".into()), Event::Abort]
        );
    }

    #[tokio::test]
    async fn anyhow_errors_keep_their_message() {
        let result: anyhow::Result<()> = with_progress(
            &Recorder::default(),
            async { Err(anyhow::anyhow!("Node unreachable")) },
            "loading",
            "done",
        )
        .await;
        assert_eq!(result.unwrap_err().to_string(), "Node unreachable");
    }

    #[tokio::test]
    async fn lines_keep_loading_message_after_failure() {
        let lines = Lines::new(Vec::new());
        let result: Result<u8, OpaqueError> = with_progress(
            &lines,
            async { Err(OpaqueError(1)) },
            "Waiting for contract to be confirmed at: KT1xyz",
            "Contract confirmed!",
        )
        .await;
        assert!(result.is_err());

        let out = String::from_utf8(lines.out.into_inner().unwrap()).unwrap();
        assert_eq!(out, "Waiting for contract to be confirmed at: KT1xyz\n");
    }

    #[tokio::test]
    async fn lines_print_loading_then_end() {
        let lines = Lines::new(Vec::new());
        let value = with_progress(
            &lines,
            async { Ok::<_, OpaqueError>(7) },
            "Deploying contract",
            "Contract deployed!",
        )
        .await;
        assert_eq!(value, Ok(7));

        let out = String::from_utf8(lines.out.into_inner().unwrap()).unwrap();
        assert_eq!(out, "Deploying contract\nContract deployed!\n");
    }

    fn in_memory_spinner() -> (Spinner, InMemoryTerm) {
        let term = InMemoryTerm::new(10, 100);
        let target = term.clone();
        let spinner =
            Spinner::with_target(move || ProgressDrawTarget::term_like(Box::new(target.clone())));
        (spinner, term)
    }

    #[tokio::test]
    async fn spinner_leaves_loading_message_after_failure() {
        let (spinner, term) = in_memory_spinner();
        let result: Result<u8, OpaqueError> = with_progress(
            &spinner,
            async { Err(OpaqueError(1)) },
            "Waiting for contract to be confirmed at: KT1xyz",
            "Contract confirmed!",
        )
        .await;
        assert!(result.is_err());
        assert!(spinner.bar.lock().unwrap().is_none());
        assert!(term
            .contents()
            .contains("Waiting for contract to be confirmed at: KT1xyz"));
    }

    #[tokio::test]
    async fn spinner_leaves_loading_message_after_success() {
        let (spinner, term) = in_memory_spinner();
        let value = with_progress(
            &spinner,
            async { Ok::<_, OpaqueError>(1) },
            "Deploying contract",
            "Contract deployed!",
        )
        .await;
        assert_eq!(value, Ok(1));
        assert!(spinner.bar.lock().unwrap().is_none());
        assert!(term.contents().contains("Deploying contract"));
    }
}
