//! PiFace Digital backend.
//!
//! The board is an MCP23S17 port expander on SPI0/CE0 at hardware address 0:
//! port A drives the eight outputs, port B reads the eight inputs. Pin
//! numbers 0-7 select the same bit on whichever port the operation uses.
//!
//! Inputs are pulled up and switch to ground, so a raw `0` bit is reported
//! as [`Level::High`] (switch closed).

use super::{BackendError, IoBackend};
use embedded_hal::spi::SpiDevice;
use gpio_core::{Level, Pin};
use rppal::spi::{Bus, Mode, SimpleHalSpiDevice, SlaveSelect, Spi};

/// Number of inputs (and outputs) on the board.
pub const PIFACE_PINS: u8 = 8;

const SPI_CLOCK_HZ: u32 = 10_000_000;
const HARDWARE_ADDRESS: u8 = 0;

const OPCODE_WRITE: u8 = 0x40 | (HARDWARE_ADDRESS << 1);
const OPCODE_READ: u8 = OPCODE_WRITE | 0x01;

// Register addresses with IOCON.BANK = 0.
const IODIRA: u8 = 0x00;
const IODIRB: u8 = 0x01;
const IOCON: u8 = 0x0A;
const GPPUB: u8 = 0x0D;
const GPIOA: u8 = 0x12;
const GPIOB: u8 = 0x13;

/// Hardware address enable; every other IOCON option off.
const IOCON_HAEN: u8 = 0x08;

/// PiFace Digital backend over any `embedded-hal` SPI device.
#[derive(Debug)]
pub struct PiFaceBackend<D = SimpleHalSpiDevice<Spi>> {
    spi: D,
    /// Shadow of the output latch (port A).
    outputs: u8,
}

impl PiFaceBackend {
    /// Open SPI0/CE0 and initialise the board.
    pub fn open() -> Result<Self, BackendError> {
        let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, SPI_CLOCK_HZ, Mode::Mode0)
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        Self::new(SimpleHalSpiDevice::new(spi))
    }
}

impl<D: SpiDevice> PiFaceBackend<D> {
    /// Initialise the board behind `spi`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Unavailable`] if the expander does not answer
    /// (the IOCON write does not read back).
    pub fn new(spi: D) -> Result<Self, BackendError> {
        let mut backend = Self { spi, outputs: 0 };
        backend.init().map_err(BackendError::Unavailable)?;
        Ok(backend)
    }

    fn init(&mut self) -> Result<(), String> {
        self.write_register(IOCON, IOCON_HAEN)?;
        let readback = self.read_register(IOCON)?;
        if readback != IOCON_HAEN {
            return Err(format!(
                "no PiFace Digital detected (IOCON read back {:#04x})",
                readback
            ));
        }

        self.write_register(GPIOA, 0x00)?;
        self.write_register(IODIRA, 0x00)?;
        self.write_register(IODIRB, 0xFF)?;
        self.write_register(GPPUB, 0xFF)?;
        Ok(())
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), String> {
        self.spi
            .write(&[OPCODE_WRITE, register, value])
            .map_err(|e| format!("SPI write failed: {:?}", e))
    }

    fn read_register(&mut self, register: u8) -> Result<u8, String> {
        let mut frame = [OPCODE_READ, register, 0x00];
        self.spi
            .transfer_in_place(&mut frame)
            .map_err(|e| format!("SPI transfer failed: {:?}", e))?;
        Ok(frame[2])
    }

    fn bit(pin: Pin) -> Result<u8, BackendError> {
        if pin.number() < PIFACE_PINS {
            Ok(1 << pin.number())
        } else {
            Err(BackendError::InvalidPin(pin))
        }
    }
}

impl<D: SpiDevice + Send> IoBackend for PiFaceBackend<D> {
    fn name(&self) -> &'static str {
        "pfio"
    }

    fn configure_input(&mut self, pin: Pin) -> Result<(), BackendError> {
        // Port B is wired as inputs at init.
        Self::bit(pin).map(|_| ())
    }

    fn configure_output(&mut self, pin: Pin, initial: Level) -> Result<(), BackendError> {
        // Port A is wired as outputs at init; only the level needs setting.
        self.write_level(pin, initial)
    }

    fn read_level(&mut self, pin: Pin) -> Result<Level, BackendError> {
        let mask = Self::bit(pin)?;
        let port = self
            .read_register(GPIOB)
            .map_err(|reason| BackendError::Io { pin, reason })?;
        Ok(Level::from_bit(port & mask == 0))
    }

    fn write_level(&mut self, pin: Pin, level: Level) -> Result<(), BackendError> {
        let mask = Self::bit(pin)?;
        let outputs = match level {
            Level::High => self.outputs | mask,
            Level::Low => self.outputs & !mask,
        };
        self.write_register(GPIOA, outputs)
            .map_err(|reason| BackendError::Io { pin, reason })?;
        self.outputs = outputs;
        Ok(())
    }

    fn release(&mut self) -> Result<(), BackendError> {
        tracing::debug!("Clearing PiFace outputs");
        self.write_register(GPIOA, 0x00)
            .map_err(BackendError::Unavailable)?;
        self.outputs = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::spi::{ErrorType, Operation};
    use std::convert::Infallible;

    /// Register-level model of the expander.
    #[derive(Debug, Default)]
    struct FakeExpander {
        registers: [u8; 0x16],
        absent: bool,
        writes: Vec<(u8, u8)>,
    }

    impl FakeExpander {
        fn frame(&mut self, buf: &mut [u8]) {
            if self.absent || buf.len() != 3 {
                buf.iter_mut().for_each(|b| *b = 0xFF);
                return;
            }
            let register = buf[1] as usize;
            if buf[0] == OPCODE_READ {
                buf[2] = self.registers[register];
            }
        }
    }

    impl ErrorType for FakeExpander {
        type Error = Infallible;
    }

    impl SpiDevice for FakeExpander {
        fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Infallible> {
            for op in operations {
                match op {
                    Operation::Write(buf) => {
                        if !self.absent && buf.len() == 3 && buf[0] == OPCODE_WRITE {
                            self.registers[buf[1] as usize] = buf[2];
                            self.writes.push((buf[1], buf[2]));
                        }
                    }
                    Operation::TransferInPlace(buf) => self.frame(buf),
                    _ => {}
                }
            }
            Ok(())
        }
    }

    fn backend() -> PiFaceBackend<FakeExpander> {
        PiFaceBackend::new(FakeExpander::default()).unwrap()
    }

    #[test]
    fn init_configures_ports() {
        let backend = backend();
        let regs = &backend.spi.registers;
        assert_eq!(regs[IOCON as usize], IOCON_HAEN);
        assert_eq!(regs[IODIRA as usize], 0x00);
        assert_eq!(regs[IODIRB as usize], 0xFF);
        assert_eq!(regs[GPPUB as usize], 0xFF);
        assert_eq!(regs[GPIOA as usize], 0x00);
    }

    #[test]
    fn missing_board_is_unavailable() {
        let expander = FakeExpander {
            absent: true,
            ..Default::default()
        };
        let result = PiFaceBackend::new(expander);
        assert!(matches!(result, Err(BackendError::Unavailable(_))));
    }

    #[test]
    fn inputs_read_inverted() {
        let mut backend = backend();
        // Input 2 pulled to ground (switch closed), the rest floating high.
        backend.spi.registers[GPIOB as usize] = 0b1111_1011;
        assert_eq!(backend.read_level(Pin::new(2)).unwrap(), Level::High);
        assert_eq!(backend.read_level(Pin::new(3)).unwrap(), Level::Low);
    }

    #[test]
    fn writes_update_output_latch() {
        let mut backend = backend();
        backend.write_level(Pin::new(0), Level::High).unwrap();
        backend.write_level(Pin::new(5), Level::High).unwrap();
        assert_eq!(backend.spi.registers[GPIOA as usize], 0b0010_0001);

        backend.write_level(Pin::new(0), Level::Low).unwrap();
        assert_eq!(backend.spi.registers[GPIOA as usize], 0b0010_0000);
    }

    #[test]
    fn out_of_range_pins_rejected() {
        let mut backend = backend();
        assert!(matches!(
            backend.configure_input(Pin::new(8)),
            Err(BackendError::InvalidPin(_))
        ));
        assert!(backend.read_level(Pin::new(9)).is_err());
        assert!(backend.write_level(Pin::new(8), Level::High).is_err());
    }

    #[test]
    fn release_clears_outputs() {
        let mut backend = backend();
        backend.configure_output(Pin::new(3), Level::High).unwrap();
        backend.release().unwrap();
        assert_eq!(backend.spi.registers[GPIOA as usize], 0x00);
        assert_eq!(backend.spi.writes.last(), Some(&(GPIOA, 0x00)));
    }
}
