use crate::BleUuid;

pub type Result<T, E = PeripheralError> = std::result::Result<T, E>;

/// Host-stack request that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOp {
    CreateService,
    StartService,
    SetAdvertisement,
    StartAdvertising,
}

impl std::fmt::Display for HostOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            HostOp::CreateService => "create service",
            HostOp::StartService => "start service",
            HostOp::SetAdvertisement => "set advertisement data",
            HostOp::StartAdvertising => "start advertising",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PeripheralError {
    #[error("dynamic service {0} is already active")]
    AlreadyActive(BleUuid),
    #[error("service {0} declared twice")]
    DuplicateService(BleUuid),
    #[error("characteristic {characteristic} declared twice in service {service}")]
    DuplicateCharacteristic {
        service: BleUuid,
        characteristic: BleUuid,
    },
    #[error("host stack failed to {op}: {source}")]
    Host {
        op: HostOp,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl PeripheralError {
    pub(crate) fn host<E>(op: HostOp, e: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        PeripheralError::Host {
            op,
            source: Box::new(e),
        }
    }

    /// Programming errors in the declared surface or activation sequence
    pub fn is_configuration(&self) -> bool {
        !self.is_transient()
    }

    /// Host-stack failures; the next poll iteration is the retry
    pub fn is_transient(&self) -> bool {
        matches!(self, PeripheralError::Host { .. })
    }
}
