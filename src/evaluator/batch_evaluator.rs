//! Batching inference server.
//!
//! Search workers submit one tensor at a time and block on a reply channel;
//! a single server thread owns the `NeuralEvaluator`, gathers requests until
//! the batch is full or the collection window closes, and evaluates them in
//! one call.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error};

use crate::errors::{ChessError, ChessResult};
use crate::evaluator::neural_evaluator::{Evaluation, NeuralEvaluator};
use crate::inputs::feature_planes::FeatureTensor;

/// How long the server waits for a batch to fill after its first request.
pub const DEFAULT_BATCH_WINDOW: Duration = Duration::from_micros(500);

struct EvalRequest {
    tensor: FeatureTensor,
    reply: Sender<Result<Evaluation, String>>,
}

#[derive(Debug)]
pub struct BatchEvaluator {
    requests: Option<Sender<EvalRequest>>,
    worker: Option<JoinHandle<()>>,
    name: String,
}

impl BatchEvaluator {
    pub fn spawn(evaluator: Box<dyn NeuralEvaluator>, batch_size: usize) -> Self {
        Self::spawn_with_window(evaluator, batch_size, DEFAULT_BATCH_WINDOW)
    }

    pub fn spawn_with_window(
        mut evaluator: Box<dyn NeuralEvaluator>,
        batch_size: usize,
        window: Duration,
    ) -> Self {
        let batch_size = batch_size.max(1);
        let name = evaluator.name().to_owned();
        let (requests, inbox) = unbounded::<EvalRequest>();
        let worker = thread::Builder::new()
            .name(format!("evaluator-{name}"))
            .spawn(move || serve(evaluator.as_mut(), &inbox, batch_size, window))
            .map_err(|e| error!("failed to start evaluator thread: {e}"))
            .ok();
        Self {
            requests: Some(requests),
            worker,
            name,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Blocks until the batch containing `tensor` has been evaluated.
    pub fn evaluate(&self, tensor: FeatureTensor) -> ChessResult<Evaluation> {
        let requests = self
            .requests
            .as_ref()
            .ok_or(ChessError::EvaluatorDisconnected)?;
        let (reply, answer) = bounded(1);
        requests
            .send(EvalRequest { tensor, reply })
            .map_err(|_| ChessError::EvaluatorDisconnected)?;
        answer
            .recv()
            .map_err(|_| ChessError::EvaluatorDisconnected)?
            .map_err(ChessError::Evaluator)
    }
}

impl Drop for BatchEvaluator {
    fn drop(&mut self) {
        // closing the channel ends the server loop
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn serve(
    evaluator: &mut dyn NeuralEvaluator,
    inbox: &Receiver<EvalRequest>,
    batch_size: usize,
    window: Duration,
) {
    let mut pending = Vec::with_capacity(batch_size);
    while let Ok(first) = inbox.recv() {
        pending.push(first);
        let deadline = Instant::now() + window;
        while pending.len() < batch_size {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match inbox.recv_timeout(remaining) {
                Ok(req) => pending.push(req),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let (tensors, replies): (Vec<FeatureTensor>, Vec<_>) =
            pending.drain(..).map(|r| (r.tensor, r.reply)).unzip();
        debug!("evaluating batch of {}", tensors.len());
        match evaluator.evaluate(&tensors) {
            Ok(results) if results.len() == tensors.len() => {
                for (reply, result) in replies.into_iter().zip(results) {
                    let _ = reply.send(Ok(result));
                }
            }
            Ok(results) => {
                let msg = ChessError::EvaluatorBatchMismatch {
                    got: results.len(),
                    expected: tensors.len(),
                }
                .to_string();
                for reply in replies {
                    let _ = reply.send(Err(msg.clone()));
                }
            }
            Err(e) => {
                let msg = e.to_string();
                for reply in replies {
                    let _ = reply.send(Err(msg.clone()));
                }
            }
        }
    }
    debug!("evaluator server shutting down");
}
