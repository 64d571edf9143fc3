use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RotationError {
    #[error("no accounts available for rotation")]
    NoAccounts,
}

/// Decision returned by [`next_account`]. When `rotated` is set the caller
/// must zero its per-session counter and make the new account's session
/// active before the next publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rotation {
    pub index: usize,
    pub rotated: bool,
}

/// Round-robin account scheduling. Pure: the caller owns the counter of
/// listings published with the current account and zeroes it on rotation.
/// A single-account list rotates to itself, which still resets the counter.
pub fn next_account(
    account_count: usize,
    current: usize,
    published_with_current: u32,
    max_per_account: u32,
) -> Result<Rotation, RotationError> {
    if account_count == 0 {
        return Err(RotationError::NoAccounts);
    }
    if published_with_current >= max_per_account.max(1) {
        Ok(Rotation {
            index: (current + 1) % account_count,
            rotated: true,
        })
    } else {
        Ok(Rotation {
            index: current,
            rotated: false,
        })
    }
}
