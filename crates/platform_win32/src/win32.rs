//! Win32 bindings: enumeration, pointer sampling and the placement backend.

use crate::{MonitorInfo, Win32Error, WindowInfo};
use gridtile_core_layout::{
    MonitorId, Point, PlacementError, PointerSample, Rect, WindowBackend, WindowId,
};
use std::ffi::c_void;
use windows::core::PWSTR;
use windows::Win32::Foundation::{CloseHandle, BOOL, HWND, LPARAM, POINT, RECT, TRUE, WPARAM};
use windows::Win32::Graphics::Dwm::{DwmGetWindowAttribute, DWMWA_CLOAKED};
use windows::Win32::Graphics::Gdi::{
    EnumDisplayMonitors, GetMonitorInfoW, MonitorFromWindow, HDC, HMONITOR, MONITORINFO,
    MONITORINFOEXW, MONITOR_DEFAULTTONEAREST,
};
use windows::Win32::System::Threading::{
    OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
    PROCESS_QUERY_LIMITED_INFORMATION,
};
use windows::Win32::UI::HiDpi::{
    SetProcessDpiAwarenessContext, DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2,
};
use windows::Win32::UI::Input::KeyboardAndMouse::{GetAsyncKeyState, VK_LBUTTON};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetAncestor, GetClassNameW, GetCursorPos, GetForegroundWindow, GetWindow,
    GetWindowLongPtrW, GetWindowRect, GetWindowTextW, GetWindowThreadProcessId, IsIconic,
    IsWindow, IsWindowVisible, IsZoomed, SendMessageTimeoutW, SetForegroundWindow, SetWindowPos,
    ShowWindowAsync, WindowFromPoint, GA_ROOT, GWL_EXSTYLE, GW_OWNER, HTCAPTION,
    SMTO_ABORTIFHUNG, SWP_ASYNCWINDOWPOS, SWP_NOACTIVATE, SWP_NOZORDER, SW_HIDE, SW_RESTORE,
    SW_SHOWNOACTIVATE, WM_NCHITTEST, WS_EX_TOOLWINDOW,
};

/// Timeout for the title-bar hit test sent to the window under the cursor.
const HIT_TEST_TIMEOUT_MS: u32 = 50;

/// Monitors flagged primary by GetMonitorInfoW.
const MONITORINFOF_PRIMARY: u32 = 1;

fn to_hwnd(id: WindowId) -> HWND {
    HWND(id as usize as *mut c_void)
}

fn to_id(hwnd: HWND) -> WindowId {
    hwnd.0 as usize as WindowId
}

fn to_rect(rect: &RECT) -> Rect {
    Rect::new(
        rect.left,
        rect.top,
        rect.right - rect.left,
        rect.bottom - rect.top,
    )
}

fn utf16_to_string(buf: &[u16], len: i32) -> String {
    let len = usize::try_from(len).unwrap_or(0).min(buf.len());
    String::from_utf16_lossy(&buf[..len])
}

/// Opt the process into per-monitor DPI awareness so rectangles are physical pixels.
pub fn set_dpi_awareness() {
    let result = unsafe { SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2) };
    if let Err(e) = result {
        tracing::debug!("SetProcessDpiAwarenessContext failed: {}", e);
    }
}

unsafe extern "system" fn collect_window(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let handles = &mut *(lparam.0 as *mut Vec<HWND>);
    handles.push(hwnd);
    TRUE
}

/// Enumerate top-level windows that could be tiled.
///
/// Filters out:
/// - Tool windows and owned windows (dialogs, popups)
/// - Windows with empty titles
/// - Windows cloaked by DWM (other virtual desktops, suspended UWP frames)
///
/// Invisible windows are still returned with `visible == false` so the
/// tracker can tell hidden windows from destroyed ones.
pub fn enumerate_windows() -> Result<Vec<WindowInfo>, Win32Error> {
    let mut handles: Vec<HWND> = Vec::new();
    unsafe {
        EnumWindows(
            Some(collect_window),
            LPARAM(&mut handles as *mut Vec<HWND> as isize),
        )
    }
    .map_err(|e| Win32Error::EnumerationFailed(e.to_string()))?;

    Ok(handles.into_iter().filter_map(window_info).collect())
}

fn window_info(hwnd: HWND) -> Option<WindowInfo> {
    unsafe {
        let ex_style = GetWindowLongPtrW(hwnd, GWL_EXSTYLE) as u32;
        if ex_style & WS_EX_TOOLWINDOW.0 != 0 {
            return None;
        }
        if GetWindow(hwnd, GW_OWNER).is_ok_and(|owner| !owner.is_invalid()) {
            return None;
        }
        if is_cloaked(hwnd) {
            return None;
        }

        let mut title = [0u16; 512];
        let title_len = GetWindowTextW(hwnd, &mut title);
        if title_len <= 0 {
            return None;
        }
        let mut class = [0u16; 256];
        let class_len = GetClassNameW(hwnd, &mut class);

        let mut process_id = 0u32;
        GetWindowThreadProcessId(hwnd, Some(&mut process_id));

        let mut rect = RECT::default();
        GetWindowRect(hwnd, &mut rect).ok()?;

        let monitor = MonitorFromWindow(hwnd, MONITOR_DEFAULTTONEAREST);

        Some(WindowInfo {
            hwnd: to_id(hwnd),
            title: utf16_to_string(&title, title_len),
            class_name: utf16_to_string(&class, class_len),
            process_id,
            executable: executable_name(process_id),
            rect: to_rect(&rect),
            monitor: monitor.0 as usize as MonitorId,
            visible: IsWindowVisible(hwnd).as_bool(),
            minimized: IsIconic(hwnd).as_bool(),
            maximized: IsZoomed(hwnd).as_bool(),
        })
    }
}

fn is_cloaked(hwnd: HWND) -> bool {
    let mut cloaked = 0u32;
    let result = unsafe {
        DwmGetWindowAttribute(
            hwnd,
            DWMWA_CLOAKED,
            &mut cloaked as *mut u32 as *mut c_void,
            std::mem::size_of::<u32>() as u32,
        )
    };
    result.is_ok() && cloaked != 0
}

fn executable_name(process_id: u32) -> Option<String> {
    if process_id == 0 {
        return None;
    }
    unsafe {
        let process = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, process_id).ok()?;
        let mut buf = [0u16; 1024];
        let mut len = buf.len() as u32;
        let result = QueryFullProcessImageNameW(
            process,
            PROCESS_NAME_WIN32,
            PWSTR(buf.as_mut_ptr()),
            &mut len,
        );
        let _ = CloseHandle(process);
        result.ok()?;

        let path = String::from_utf16_lossy(&buf[..len as usize]);
        path.rsplit('\\').next().map(str::to_string)
    }
}

unsafe extern "system" fn collect_monitor(
    monitor: HMONITOR,
    _hdc: HDC,
    _clip: *mut RECT,
    lparam: LPARAM,
) -> BOOL {
    let monitors = &mut *(lparam.0 as *mut Vec<MonitorInfo>);

    let mut info = MONITORINFOEXW::default();
    info.monitorInfo.cbSize = std::mem::size_of::<MONITORINFOEXW>() as u32;
    if GetMonitorInfoW(monitor, &mut info as *mut MONITORINFOEXW as *mut MONITORINFO).as_bool() {
        let name_len = info
            .szDevice
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(info.szDevice.len());
        monitors.push(MonitorInfo {
            id: monitor.0 as usize as MonitorId,
            rect: to_rect(&info.monitorInfo.rcMonitor),
            work_area: to_rect(&info.monitorInfo.rcWork),
            is_primary: info.monitorInfo.dwFlags & MONITORINFOF_PRIMARY != 0,
            device_name: String::from_utf16_lossy(&info.szDevice[..name_len]),
        });
    }
    TRUE
}

/// Enumerate attached monitors with their work areas.
pub fn enumerate_monitors() -> Result<Vec<MonitorInfo>, Win32Error> {
    let mut monitors: Vec<MonitorInfo> = Vec::new();
    let ok = unsafe {
        EnumDisplayMonitors(
            None,
            None,
            Some(collect_monitor),
            LPARAM(&mut monitors as *mut Vec<MonitorInfo> as isize),
        )
    };
    if !ok.as_bool() {
        return Err(Win32Error::MonitorQueryFailed(
            "EnumDisplayMonitors returned FALSE".to_string(),
        ));
    }
    Ok(monitors)
}

/// The window that currently has keyboard focus.
pub fn foreground_window() -> Option<WindowId> {
    let hwnd = unsafe { GetForegroundWindow() };
    if hwnd.is_invalid() {
        None
    } else {
        Some(to_id(hwnd))
    }
}

/// Sample the pointer for drag detection.
///
/// `title_bar_window` is set only when the left button is down over the
/// caption of a top-level window, so the hit test is skipped otherwise.
pub fn pointer_sample() -> Result<PointerSample, Win32Error> {
    let mut pos = POINT::default();
    unsafe { GetCursorPos(&mut pos) }
        .map_err(|e| Win32Error::EnumerationFailed(format!("GetCursorPos: {}", e)))?;

    let left_down = unsafe { GetAsyncKeyState(i32::from(VK_LBUTTON.0)) } as u16 & 0x8000 != 0;
    let title_bar_window = if left_down {
        caption_under(pos)
    } else {
        None
    };

    Ok(PointerSample {
        position: Point::new(pos.x, pos.y),
        left_down,
        title_bar_window,
    })
}

fn caption_under(pos: POINT) -> Option<WindowId> {
    unsafe {
        let hit = WindowFromPoint(pos);
        if hit.is_invalid() {
            return None;
        }
        let root = GetAncestor(hit, GA_ROOT);
        if root.is_invalid() {
            return None;
        }

        let packed = ((pos.y as u16 as u32) << 16) | (pos.x as u16 as u32);
        let mut result = 0usize;
        let sent = SendMessageTimeoutW(
            root,
            WM_NCHITTEST,
            WPARAM(0),
            LPARAM(packed as i32 as isize),
            SMTO_ABORTIFHUNG,
            HIT_TEST_TIMEOUT_MS,
            Some(&mut result),
        );
        if sent.0 == 0 {
            return None;
        }
        if result as u32 == HTCAPTION {
            Some(to_id(root))
        } else {
            None
        }
    }
}

/// Placement backend driving real windows.
///
/// Stateless: the registry poller learns about workspace-hidden windows from
/// the coordinator's slot maps.
#[derive(Debug, Clone, Copy, Default)]
pub struct Win32Backend;

impl Win32Backend {
    pub fn new() -> Self {
        Self
    }

    fn check_alive(&self, window: WindowId) -> Result<HWND, PlacementError> {
        if self.is_alive(window) {
            Ok(to_hwnd(window))
        } else {
            Err(PlacementError::Stale(window))
        }
    }
}

impl WindowBackend for Win32Backend {
    fn is_alive(&self, window: WindowId) -> bool {
        unsafe { IsWindow(Some(to_hwnd(window))) }.as_bool()
    }

    fn move_resize(&mut self, window: WindowId, rect: Rect) -> Result<(), PlacementError> {
        let hwnd = self.check_alive(window)?;
        unsafe {
            if IsIconic(hwnd).as_bool() || IsZoomed(hwnd).as_bool() {
                let _ = ShowWindowAsync(hwnd, SW_RESTORE);
            }
            SetWindowPos(
                hwnd,
                None,
                rect.x,
                rect.y,
                rect.width,
                rect.height,
                SWP_ASYNCWINDOWPOS | SWP_NOZORDER | SWP_NOACTIVATE,
            )
        }
        .map_err(|e| PlacementError::Rejected {
            window,
            reason: e.to_string(),
        })
    }

    fn show(&mut self, window: WindowId) -> Result<(), PlacementError> {
        let hwnd = self.check_alive(window)?;
        unsafe {
            let _ = ShowWindowAsync(hwnd, SW_SHOWNOACTIVATE);
        }
        Ok(())
    }

    fn hide(&mut self, window: WindowId) -> Result<(), PlacementError> {
        let hwnd = self.check_alive(window)?;
        unsafe {
            let _ = ShowWindowAsync(hwnd, SW_HIDE);
        }
        Ok(())
    }

    fn activate(&mut self, window: WindowId) -> Result<(), PlacementError> {
        let hwnd = self.check_alive(window)?;
        if unsafe { SetForegroundWindow(hwnd) }.as_bool() {
            Ok(())
        } else {
            Err(PlacementError::Rejected {
                window,
                reason: "SetForegroundWindow refused".to_string(),
            })
        }
    }
}
