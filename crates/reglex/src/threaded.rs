use std::{
    io::Read,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
};

use crossbeam_channel::{Receiver, Sender};

use crate::{
    error::LexError,
    lexer::{Lexer, LexerOptions},
    LexicToken, TokenSource,
};

enum Message {
    Token(LexicToken),
    Invalid(LexError),
    Failed(LexError),
    End,
}

/// Runs a [`Lexer`] on a worker thread which sends the tokens over a bounded channel.
pub struct ThreadedLexer<R> {
    lexer: Option<Lexer<R>>,
    capacity: usize,
    running: Arc<AtomicBool>,
    receiver: Option<Receiver<Message>>,
    worker: Option<JoinHandle<()>>,
    finished: Option<LexError>,
}

impl<R: Read + Send + 'static> ThreadedLexer<R> {
    pub fn new(lexer: Lexer<R>, options: &LexerOptions) -> ThreadedLexer<R> {
        ThreadedLexer {
            lexer: Some(lexer),
            capacity: options.queue_capacity.max(1),
            running: Arc::new(AtomicBool::new(false)),
            receiver: None,
            worker: None,
            finished: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Starts the worker thread. Returns false if it has already been started.
    pub fn start(&mut self) -> bool {
        if self.running.swap(true, Ordering::AcqRel) {
            return false;
        }
        let Some(lexer) = self.lexer.take() else {
            self.running.store(false, Ordering::Release);
            return false;
        };

        let (sender, receiver) = crossbeam_channel::bounded(self.capacity);
        let running = self.running.clone();
        let worker = std::thread::Builder::new()
            .name("reglex-worker".to_owned())
            .spawn(move || {
                produce(lexer, &sender);
                running.store(false, Ordering::Release);
            });

        match worker {
            Ok(worker) => {
                self.receiver = Some(receiver);
                self.worker = Some(worker);
                true
            }
            Err(err) => {
                log::error!("failed to spawn the lexer worker: {err}");
                self.running.store(false, Ordering::Release);
                self.finished = Some(LexError::from(err));
                false
            }
        }
    }

    /// Blocks until the worker produces the next token, starting it on first use.
    pub fn next_token(&mut self) -> Result<LexicToken, LexError> {
        if let Some(finished) = &self.finished {
            return Err(finished.clone());
        }
        if self.receiver.is_none() {
            self.start();
        }
        let Some(receiver) = &self.receiver else {
            return Err(self.finish(LexError::WorkerLost));
        };

        match receiver.recv() {
            Ok(Message::Token(token)) => Ok(token),
            Ok(Message::Invalid(err)) => Err(err),
            Ok(Message::Failed(err)) => Err(self.finish(err)),
            Ok(Message::End) => Err(self.finish(LexError::EndOfStream)),
            Err(_) => Err(self.finish(LexError::WorkerLost)),
        }
    }

    fn finish(&mut self, err: LexError) -> LexError {
        self.finished = Some(err.clone());
        err
    }
}

fn produce<R: Read>(mut lexer: Lexer<R>, sender: &Sender<Message>) {
    loop {
        let (message, last) = match lexer.next_token() {
            Ok(token) => (Message::Token(token), false),
            Err(LexError::EndOfStream) => (Message::End, true),
            Err(err) if err.is_recoverable() => (Message::Invalid(err), false),
            Err(err) => (Message::Failed(err), true),
        };
        // the consumer is gone
        if sender.send(message).is_err() || last {
            return;
        }
    }
}

impl<R> Drop for ThreadedLexer<R> {
    /// Never waits for the worker. A worker blocked on the full channel fails
    /// its next send, one blocked in `read` exits once the read returns.
    fn drop(&mut self) {
        self.receiver.take();
        let Some(worker) = self.worker.take() else {
            return;
        };
        if !worker.is_finished() {
            log::debug!("detaching the lexer worker");
            return;
        }
        if worker.join().is_err() {
            log::error!("the lexer worker panicked");
        }
    }
}

impl<R: Read + Send + 'static> TokenSource for ThreadedLexer<R> {
    fn next_token(&mut self) -> Result<LexicToken, LexError> {
        ThreadedLexer::next_token(self)
    }
}

#[cfg(test)]
mod tests {
    use gbnf::parse;

    use super::*;
    use crate::assemble::{assemble, AssembleOptions};

    fn threaded<R: Read + Send + 'static>(reader: R, capacity: usize) -> ThreadedLexer<R> {
        let grammar = parse(r#"<ident> := "\w+" ; <operator> := "[;]" ;"#).unwrap();
        let grammar = Arc::new(assemble(&grammar, &AssembleOptions::default()).unwrap());
        let options = LexerOptions {
            buffer_size: 3,
            queue_capacity: capacity,
        };
        ThreadedLexer::new(Lexer::new(grammar, reader, &options), &options)
    }

    #[test]
    fn tokens_arrive_in_order() {
        let mut lexer = threaded("a;bb ccc;".as_bytes(), 1);
        let mut texts = Vec::new();
        loop {
            match lexer.next_token() {
                Ok(token) => texts.push(token.text),
                Err(LexError::EndOfStream) => break,
                Err(err) => panic!("{err}"),
            }
        }
        assert_eq!(texts, ["a", ";", "bb", "ccc", ";"]);
        assert!(matches!(lexer.next_token(), Err(LexError::EndOfStream)));
    }

    #[test]
    fn single_producer() {
        let mut lexer = threaded("a".as_bytes(), 4);
        assert!(lexer.start());
        assert!(!lexer.start());
        assert_eq!(lexer.next_token().unwrap().text, "a");
        assert!(matches!(lexer.next_token(), Err(LexError::EndOfStream)));
        assert!(!lexer.start());
    }

    #[test]
    fn fatal_error_is_replayed() {
        let mut lexer = threaded("a ? b".as_bytes(), 4);
        assert_eq!(lexer.next_token().unwrap().text, "a");
        assert!(matches!(lexer.next_token(), Err(LexError::UnmatchableInput { .. })));
        assert!(matches!(lexer.next_token(), Err(LexError::UnmatchableInput { .. })));
    }

    #[test]
    fn dropping_unblocks_the_worker() {
        let input: &'static str = "x ".repeat(1000).leak();
        let mut lexer = threaded(input.as_bytes(), 1);
        assert_eq!(lexer.next_token().unwrap().text, "x");
        drop(lexer);
    }

    #[test]
    fn dropping_does_not_wait_for_a_blocked_read() {
        struct Stalled(Receiver<()>);
        impl Read for Stalled {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                let _ = self.0.recv();
                Ok(0)
            }
        }

        let (release, stalled) = crossbeam_channel::bounded(0);
        let mut lexer = threaded(Stalled(stalled), 1);
        assert!(lexer.start());
        drop(lexer);
        drop(release);
    }
}
