//! The dedicated run worker
//!
//! One task owns the [`Controller`] and therefore the bench. Jobs are queued and run strictly one at a
//! time, so at most one sweep or calibration ever drives the instruments. Each job's outcome comes
//! back on its own oneshot channel.

use tokio::{
    sync::{ mpsc, oneshot },
    task::JoinHandle,
};
use tracing::{ debug, info };
use crate::{
    calibrate::CalibrationKind,
    cancel::CancelToken,
    controller::{ Controller, RunOutcome },
    params::SecondaryParameters,
};

const QUEUE_DEPTH: usize = 8;

#[derive(Debug, Clone)]
pub enum Job
{
    Check
    {
        profile: String,
        params: SecondaryParameters,
    },
    Calibrate
    {
        kind: CalibrationKind,
        params: SecondaryParameters,
    },
    Measure
    {
        profile: String,
        params: SecondaryParameters,
    },
}

struct Request
{
    job: Job,
    token: CancelToken,
    done: oneshot::Sender<RunOutcome>,
}

pub struct WorkerHandle
{
    queue: mpsc::Sender<Request>,
    task: JoinHandle<Controller>,
}

/// Move `controller` onto its own task
pub fn spawn_worker(controller: Controller) -> WorkerHandle
{
    let (queue, requests) = mpsc::channel(QUEUE_DEPTH);
    let task = tokio::spawn(work(controller, requests));

    WorkerHandle {
        queue: queue,
        task: task,
    }
}

async fn work(mut controller: Controller, mut requests: mpsc::Receiver<Request>) -> Controller
{
    while let Some(request) = requests.recv().await {
        debug!(job = ?request.job, "job started");
        let token = request.token;

        let outcome: RunOutcome = match request.job {
            Job::Check { profile, params } => controller.check(&token, &profile, &params).await.into(),
            Job::Calibrate { kind, params } => controller.calibrate(&token, kind, &params).await.into(),
            Job::Measure { profile, params } => controller.measure(&token, &profile, params).await.into(),
        };
        info!(%outcome, "job finished");

        // the submitter may have stopped waiting
        let _ = request.done.send(outcome);
    }

    controller
}

impl WorkerHandle
{
    /// Queue a job. The receiver resolves once the job has run.
    ///
    /// If the worker has gone away the receiver resolves to an error straight away.
    pub async fn submit(&self, job: Job, token: CancelToken) -> oneshot::Receiver<RunOutcome>
    {
        let (done, outcome) = oneshot::channel();
        let request = Request {
            job: job,
            token: token,
            done: done,
        };

        if self.queue.send(request).await.is_err() {
            debug!("worker gone, job dropped");
        }

        outcome
    }

    /// Stop taking jobs, wait for queued ones and take the controller back
    pub async fn shutdown(self) -> Result<Controller, tokio::task::JoinError>
    {
        drop(self.queue);
        self.task.await
    }
}

#[cfg(test)]
mod tests
{
    use super::{ spawn_worker, Job };
    use crate::{
        cancel::CancelToken,
        controller::{ Controller, RunOutcome },
        error::Error,
        params::SecondaryParameters,
        replay::{ bench, Fixture, Journal },
    };

    #[tokio::test]
    async fn jobs_run_in_order_and_report()
    {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::default();
        let mut controller = Controller::with(bench(&Fixture::default(), &journal), dir.path()).unwrap();
        controller.connect().await;
        let worker = spawn_worker(controller);

        let unknown = worker.submit(
            Job::Check { profile: "+40".to_string(), params: SecondaryParameters::default() },
            CancelToken::new(),
        ).await;
        let check = worker.submit(
            Job::Check { profile: "+25".to_string(), params: SecondaryParameters::default() },
            CancelToken::new(),
        ).await;

        assert!(matches!(unknown.await.unwrap(), RunOutcome::Failed(Error::UnknownProfile(_))));
        assert!(check.await.unwrap().is_completed());

        let controller = worker.shutdown().await.unwrap();
        assert!(controller.is_present());
    }

    #[tokio::test]
    async fn cancelled_token_reports_cancelled()
    {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = Controller::with(bench(&Fixture::default(), &Journal::default()), dir.path()).unwrap();
        controller.connect().await;
        let worker = spawn_worker(controller);

        let token = CancelToken::new();
        token.cancel();
        let outcome = worker.submit(
            Job::Measure { profile: "+85".to_string(), params: SecondaryParameters::default() },
            token,
        ).await;

        assert!(matches!(outcome.await.unwrap(), RunOutcome::Cancelled));
        worker.shutdown().await.unwrap();
    }
}
