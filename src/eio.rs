use crate::io;

pub struct Reader<'a, T: io::Read>(pub(crate) &'a T);

impl<'a, T: io::Read> Reader<'a, T> {
    pub fn new(read: &'a T) -> Self {
        Self(read)
    }
}

impl<'a, T: io::Read> embedded_io::ErrorType for Reader<'a, T> {
    type Error = io::Error;
}

impl<'a, T: io::Read> embedded_io::Read for Reader<'a, T> {
    /// The end of the allocated extents reads as `Ok(0)`.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        match self.0.read(buf) {
            Err(io::Error::FILE_EMPTY) => Ok(0),
            result => result,
        }
    }

    fn read_exact(
        &mut self,
        buf: &mut [u8],
    ) -> Result<(), embedded_io::ReadExactError<Self::Error>> {
        self.0.read_exact(buf).map_err(|e| match e {
            io::Error::FILE_EMPTY => embedded_io::ReadExactError::UnexpectedEof,
            e => embedded_io::ReadExactError::Other(e),
        })
    }
}

pub struct Writer<'a, T: io::Write>(pub(crate) &'a T);

impl<'a, T: io::Write> Writer<'a, T> {
    pub fn new(write: &'a T) -> Self {
        Self(write)
    }
}

impl<'a, T: io::Write> embedded_io::ErrorType for Writer<'a, T> {
    type Error = io::Error;
}

impl<'a, T: io::Write> embedded_io::Write for Writer<'a, T> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.0.flush()
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        self.0.write_all(buf)
    }
}
