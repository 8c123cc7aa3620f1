use std::sync::{
    atomic::{ AtomicBool, Ordering },
    Arc,
};

/// Single-shot cooperative cancellation flag shared between a run's owner and its procedure
///
/// Procedures poll it once per sweep point. Nothing ever clears it: a new run needs a new token.
#[derive(Debug, Clone, Default)]
pub struct CancelToken
{
    flag: Arc<AtomicBool>,
}

impl CancelToken
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn cancel(&self)
    {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool
    {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests
{
    use super::CancelToken;

    #[test]
    fn clones_share_the_flag()
    {
        let owner = CancelToken::new();
        let worker = owner.clone();
        assert!(!worker.is_cancelled());

        owner.cancel();
        assert!(worker.is_cancelled());
        assert!(!CancelToken::new().is_cancelled());
    }
}
