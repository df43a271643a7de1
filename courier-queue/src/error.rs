// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use courier_common::error::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("unrecoverable queue implementation error")]
    Library,
}

impl From<QueueError> for ErrorKind {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Database(e) => ErrorKind::TransientDependency(e.to_string()),
            QueueError::Library => ErrorKind::Internal("queue library error".into()),
        }
    }
}
