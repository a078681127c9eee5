/// PEM-encoded SSL material handed to the transport when it is constructed.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SslCredentials {
    root_certificates: Option<Vec<u8>>,
    client_private_key: Option<Vec<u8>>,
    client_cert_chain: Option<Vec<u8>>,
}

impl std::fmt::Debug for SslCredentials {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SslCredentials")
            .field("root_certificates", &self.root_certificates.is_some())
            .field("client_private_key", &"<redacted>")
            .field("client_cert_chain", &self.client_cert_chain.is_some())
            .finish()
    }
}

impl SslCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root_certificates(mut self, root_certificates_pem: impl Into<Vec<u8>>) -> Self {
        self.root_certificates = Some(root_certificates_pem.into());
        self
    }

    pub fn client_identity(
        mut self,
        cert_chain_pem: impl Into<Vec<u8>>,
        private_key_pem: impl Into<Vec<u8>>,
    ) -> Self {
        self.client_cert_chain = Some(cert_chain_pem.into());
        self.client_private_key = Some(private_key_pem.into());
        self
    }

    pub fn root_certificates_pem(&self) -> Option<&[u8]> {
        self.root_certificates.as_deref()
    }

    pub fn client_private_key_pem(&self) -> Option<&[u8]> {
        self.client_private_key.as_deref()
    }

    pub fn client_cert_chain_pem(&self) -> Option<&[u8]> {
        self.client_cert_chain.as_deref()
    }

    pub fn has_client_identity(&self) -> bool {
        self.client_private_key.is_some() && self.client_cert_chain.is_some()
    }
}
