//! DLPack - Cross-Boundary Tensor Interchange
//!
//! `#[repr(C)]` mirrors of the DLPack `DLTensor` and `DLManagedTensor`
//! structs, an owning [`ManagedTensor`] wrapper, and the conversions between
//! descriptors and native [`Tensor`] values.
//!
//! Ownership follows the DLPack contract: whoever holds a `DLManagedTensor*`
//! owns it and must call its deleter exactly once. [`ManagedTensor`] does that
//! on drop. Imports always copy, so the descriptor can be released as soon as
//! the native tensor exists. Exports are contiguous and hand over the tensor's
//! storage without copying when nothing else shares it.
//!
//! @version 0.1.0
//! @author `OpBridge` Development Team

use std::ffi::c_void;
use std::fmt;
use std::mem;
use std::ptr::{self, NonNull};

use bytemuck::Pod;

use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::storage::Storage;
use crate::tensor::Tensor;

// =============================================================================
// Constants
// =============================================================================

/// Signed integer type code.
pub const DL_INT: u8 = 0;
/// Unsigned integer type code.
pub const DL_UINT: u8 = 1;
/// IEEE float type code.
pub const DL_FLOAT: u8 = 2;
/// Brain float type code.
pub const DL_BFLOAT: u8 = 4;
/// Boolean type code.
pub const DL_BOOL: u8 = 6;
/// Host memory device type.
pub const DL_CPU: i32 = 1;

// =============================================================================
// Raw Descriptors
// =============================================================================

/// Element type of a DLPack tensor.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DLDataType {
    /// Type code (`DL_INT`, `DL_FLOAT`, ...).
    pub code: u8,
    /// Bits per lane.
    pub bits: u8,
    /// Number of lanes; 1 for scalar element types.
    pub lanes: u16,
}

impl DLDataType {
    /// 64-bit signed integer.
    pub const INT64: Self = Self::new(DL_INT, 64);
    /// 32-bit signed integer.
    pub const INT32: Self = Self::new(DL_INT, 32);
    /// 32-bit float.
    pub const FLOAT32: Self = Self::new(DL_FLOAT, 32);
    /// 64-bit float.
    pub const FLOAT64: Self = Self::new(DL_FLOAT, 64);
    /// 8-bit unsigned integer.
    pub const UINT8: Self = Self::new(DL_UINT, 8);
    /// One-byte boolean.
    pub const BOOL: Self = Self::new(DL_BOOL, 8);

    /// Creates a single-lane data type.
    #[must_use]
    pub const fn new(code: u8, bits: u8) -> Self {
        Self {
            code,
            bits,
            lanes: 1,
        }
    }

    /// Maps a native dtype to its DLPack code.
    #[must_use]
    pub const fn from_dtype(dtype: DType) -> Self {
        match dtype {
            DType::F32 => Self::FLOAT32,
            DType::F64 => Self::FLOAT64,
            DType::I32 => Self::INT32,
            DType::I64 => Self::INT64,
            DType::U8 => Self::UINT8,
            DType::Bool => Self::BOOL,
        }
    }

    /// Maps a DLPack code to a native dtype, if one exists.
    #[must_use]
    pub fn to_dtype(self) -> Option<DType> {
        match self {
            Self::FLOAT32 => Some(DType::F32),
            Self::FLOAT64 => Some(DType::F64),
            Self::INT32 => Some(DType::I32),
            Self::INT64 => Some(DType::I64),
            Self::UINT8 => Some(DType::U8),
            Self::BOOL => Some(DType::Bool),
            _ => None,
        }
    }
}

impl fmt::Display for DLDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.code {
            DL_INT => "int",
            DL_UINT => "uint",
            DL_FLOAT => "float",
            DL_BFLOAT => "bfloat",
            DL_BOOL => "bool",
            _ => "code",
        };
        write!(f, "{}{}", kind, self.bits)?;
        if self.lanes != 1 {
            write!(f, "x{}", self.lanes)?;
        }
        Ok(())
    }
}

/// Device a DLPack tensor lives on.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DLDevice {
    /// Device type (`DL_CPU`, ...).
    pub device_type: i32,
    /// Ordinal of the device.
    pub device_id: i32,
}

impl DLDevice {
    /// The host CPU.
    pub const CPU: Self = Self {
        device_type: DL_CPU,
        device_id: 0,
    };
}

/// Borrowed view of a tensor's memory.
#[repr(C)]
#[derive(Debug)]
pub struct DLTensor {
    /// Base data pointer.
    pub data: *mut c_void,
    /// Device holding `data`.
    pub device: DLDevice,
    /// Number of dimensions.
    pub ndim: i32,
    /// Element type.
    pub dtype: DLDataType,
    /// `ndim` extents.
    pub shape: *mut i64,
    /// `ndim` strides in elements, or null for row-major contiguous.
    pub strides: *mut i64,
    /// Offset in bytes from `data` to the first element.
    pub byte_offset: u64,
}

/// A `DLTensor` together with the context needed to release it.
#[repr(C)]
#[derive(Debug)]
pub struct DLManagedTensor {
    /// The tensor view.
    pub dl_tensor: DLTensor,
    /// Producer-private context.
    pub manager_ctx: *mut c_void,
    /// Releases the tensor; called once by the consumer.
    pub deleter: Option<unsafe extern "C" fn(*mut DLManagedTensor)>,
}

// =============================================================================
// ManagedTensor
// =============================================================================

/// Owning handle to a `DLManagedTensor`; calls the deleter on drop.
pub struct ManagedTensor {
    raw: NonNull<DLManagedTensor>,
}

// SAFETY: a DLManagedTensor is an exclusively owned, immutable view; the
// deleter contract allows it to be invoked from any thread.
unsafe impl Send for ManagedTensor {}

impl ManagedTensor {
    /// Takes ownership of a raw descriptor.
    ///
    /// Returns `None` for a null pointer.
    ///
    /// # Safety
    /// `raw` must point to a live `DLManagedTensor` whose `shape` (and
    /// `strides`, when non-null) hold `ndim` entries, and ownership must not be
    /// claimed by anyone else.
    pub unsafe fn from_raw(raw: *mut DLManagedTensor) -> Option<Self> {
        NonNull::new(raw).map(|raw| Self { raw })
    }

    /// Releases ownership, returning the raw descriptor.
    #[must_use]
    pub fn into_raw(self) -> *mut DLManagedTensor {
        let raw = self.raw.as_ptr();
        mem::forget(self);
        raw
    }

    fn tensor(&self) -> &DLTensor {
        // SAFETY: `from_raw` requires a live descriptor.
        unsafe { &self.raw.as_ref().dl_tensor }
    }

    /// Element type.
    pub fn dtype(&self) -> DLDataType {
        self.tensor().dtype
    }

    /// Device the data lives on.
    pub fn device(&self) -> DLDevice {
        self.tensor().device
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        usize::try_from(self.tensor().ndim).unwrap_or(0)
    }

    /// Extents, empty for a 0-d tensor.
    pub fn shape(&self) -> &[i64] {
        let t = self.tensor();
        if self.ndim() == 0 || t.shape.is_null() {
            return &[];
        }
        // SAFETY: `from_raw` requires `ndim` valid entries.
        unsafe { std::slice::from_raw_parts(t.shape, self.ndim()) }
    }

    /// Strides in elements, or `None` when the tensor is row-major contiguous.
    pub fn strides(&self) -> Option<&[i64]> {
        let t = self.tensor();
        if t.strides.is_null() || self.ndim() == 0 {
            return None;
        }
        // SAFETY: non-null strides hold `ndim` entries.
        Some(unsafe { std::slice::from_raw_parts(t.strides, self.ndim()) })
    }

    /// Extents as `usize`, rejecting negative or missing dimensions.
    pub fn dims(&self) -> Result<Vec<usize>> {
        let t = self.tensor();
        if t.ndim < 0 {
            return Err(Error::interchange(format!("negative ndim {}", t.ndim)));
        }
        if t.ndim > 0 && t.shape.is_null() {
            return Err(Error::interchange("shape pointer is null"));
        }
        self.shape()
            .iter()
            .map(|&d| {
                usize::try_from(d).map_err(|_| Error::interchange(format!("negative extent {d}")))
            })
            .collect()
    }

    /// Total number of elements.
    pub fn numel(&self) -> Result<usize> {
        Ok(self.dims()?.iter().product())
    }

    /// True for a 0-d tensor or a 1-d tensor of length 1.
    pub fn is_single_element(&self) -> bool {
        match self.shape() {
            [] => self.ndim() == 0,
            [1] => true,
            _ => false,
        }
    }

    /// Copies the elements out in row-major order.
    ///
    /// The caller picks `T` to match [`ManagedTensor::dtype`]; only the element
    /// size is checked here.
    pub fn read_elements<T: Pod>(&self) -> Result<Vec<T>> {
        let t = self.tensor();
        if t.device.device_type != DL_CPU {
            return Err(Error::interchange(format!(
                "device type {} is not CPU",
                t.device.device_type
            )));
        }
        if t.dtype.lanes != 1 || usize::from(t.dtype.bits) != mem::size_of::<T>() * 8 {
            return Err(Error::interchange(format!(
                "element type {} does not match a {}-byte read",
                t.dtype,
                mem::size_of::<T>()
            )));
        }

        let dims = self.dims()?;
        let count: usize = dims.iter().product();
        if count == 0 {
            return Ok(Vec::new());
        }
        if t.data.is_null() {
            return Err(Error::interchange("data pointer is null"));
        }

        let offset = usize::try_from(t.byte_offset)
            .map_err(|_| Error::interchange("byte offset overflows"))?;
        // SAFETY: the producer guarantees `data + byte_offset` is the first element.
        let base = unsafe { t.data.cast::<u8>().add(offset).cast::<T>() };

        let out = match self.strides() {
            None => (0..count)
                // SAFETY: contiguous layout holds `count` elements.
                .map(|i| unsafe { ptr::read_unaligned(base.add(i)) })
                .collect(),
            Some(strides) => {
                let mut out = Vec::with_capacity(count);
                let mut index = vec![0usize; dims.len()];
                for _ in 0..count {
                    let elem_offset: i64 = index
                        .iter()
                        .zip(strides)
                        .map(|(&i, &s)| i as i64 * s)
                        .sum();
                    // SAFETY: strides describe in-bounds elements for every index.
                    out.push(unsafe { ptr::read_unaligned(base.offset(elem_offset as isize)) });
                    for d in (0..dims.len()).rev() {
                        index[d] += 1;
                        if index[d] < dims[d] {
                            break;
                        }
                        index[d] = 0;
                    }
                }
                out
            }
        };
        Ok(out)
    }
}

impl Drop for ManagedTensor {
    fn drop(&mut self) {
        // SAFETY: we own the descriptor and release it exactly once.
        unsafe {
            if let Some(deleter) = self.raw.as_ref().deleter {
                deleter(self.raw.as_ptr());
            }
        }
    }
}

impl fmt::Debug for ManagedTensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedTensor")
            .field("dtype", &self.dtype())
            .field("shape", &self.shape())
            .field("device", &self.device())
            .finish()
    }
}

// =============================================================================
// Export
// =============================================================================

/// Heap block behind every exported tensor. `managed` must stay first so the
/// `DLManagedTensor*` handed out is also a pointer to this block.
#[repr(C)]
struct ExportedTensor {
    managed: DLManagedTensor,
    shape: Vec<i64>,
    storage: Storage,
}

unsafe extern "C" fn release_exported(managed: *mut DLManagedTensor) {
    if !managed.is_null() {
        // SAFETY: only `Tensor::into_dlpack` installs this deleter, on a boxed ExportedTensor.
        drop(unsafe { Box::from_raw(managed.cast::<ExportedTensor>()) });
    }
}

impl Tensor {
    /// Exports the tensor as a contiguous DLPack descriptor.
    ///
    /// The storage moves into the descriptor without copying when this tensor
    /// is its only owner.
    #[must_use]
    pub fn into_dlpack(self) -> ManagedTensor {
        let dtype = DLDataType::from_dtype(self.dtype());
        let shape: Vec<i64> = self.shape().iter().map(|&d| d as i64).collect();
        let ndim = shape.len() as i32;

        let mut exported = Box::new(ExportedTensor {
            managed: DLManagedTensor {
                dl_tensor: DLTensor {
                    data: ptr::null_mut(),
                    device: DLDevice::CPU,
                    ndim,
                    dtype,
                    shape: ptr::null_mut(),
                    strides: ptr::null_mut(),
                    byte_offset: 0,
                },
                manager_ctx: ptr::null_mut(),
                deleter: Some(release_exported),
            },
            shape,
            storage: self.into_storage(),
        });

        exported.managed.dl_tensor.data = exported.storage.as_mut_ptr();
        if ndim > 0 {
            exported.managed.dl_tensor.shape = exported.shape.as_mut_ptr();
        }
        let ctx: *mut ExportedTensor = &mut *exported;
        exported.managed.manager_ctx = ctx.cast();

        ManagedTensor {
            raw: NonNull::from(Box::leak(exported)).cast(),
        }
    }

    // =========================================================================
    // Import
    // =========================================================================

    /// Imports a DLPack descriptor by copying its elements.
    ///
    /// The descriptor is released when this returns.
    pub fn from_dlpack(managed: ManagedTensor) -> Result<Self> {
        let dl_dtype = managed.dtype();
        let dtype = dl_dtype
            .to_dtype()
            .ok_or_else(|| Error::interchange(format!("unsupported element type {dl_dtype}")))?;
        let dims = managed.dims()?;

        let storage = match dtype {
            DType::F32 => Storage::F32(managed.read_elements()?),
            DType::F64 => Storage::F64(managed.read_elements()?),
            DType::I32 => Storage::I32(managed.read_elements()?),
            DType::I64 => Storage::I64(managed.read_elements()?),
            DType::U8 => Storage::U8(managed.read_elements()?),
            DType::Bool => Storage::Bool(
                managed
                    .read_elements::<u8>()?
                    .into_iter()
                    .map(|b| b != 0)
                    .collect(),
            ),
        };
        Self::from_storage(storage, &dims)
    }
}

// =============================================================================
// Tests
// =============================================================================
